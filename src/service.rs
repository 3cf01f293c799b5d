use std::collections::VecDeque;

use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use reqwest::header::ACCEPT;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::models::{SimulationDetails, SimulationParameters};
use crate::sse::SseStreamParser;

pub const START_PATH: &str = "/api/simulation/start";
pub const STOP_PATH: &str = "/api/simulation/stop";
pub const DETAILS_PATH: &str = "/api/simulation/details";

pub type DetailsStream = BoxStream<'static, Result<SimulationDetails>>;

#[allow(async_fn_in_trait)]
pub trait SimulationService {
    async fn start(&self, parameters: &SimulationParameters) -> Result<String>;
    async fn stop(&self) -> Result<SimulationDetails>;
    async fn fetch_details(&self) -> Result<SimulationDetails>;
    fn details_stream(&self) -> DetailsStream;
}

#[derive(Debug, Clone)]
pub struct HttpSimulationService {
    http: Client,
    config: ClientConfig,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

impl HttpSimulationService {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let http = Client::builder().build()?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn with_timeout(&self, request: RequestBuilder) -> RequestBuilder {
        match self.config.timeout {
            Some(timeout) => request.timeout(timeout),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = self.with_timeout(request).send().await?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(server_error(response).await)
        }
    }

    async fn snapshot(&self, request: RequestBuilder) -> Result<SimulationDetails> {
        let body = self.send(request).await?.text().await?;
        serde_json::from_str(&body)
            .map_err(|err| Error::Unexpected(format!("invalid details payload: {}", err)))
    }
}

impl SimulationService for HttpSimulationService {
    async fn start(&self, parameters: &SimulationParameters) -> Result<String> {
        debug!(?parameters, "posting start request");
        let request = self.http.post(self.endpoint(START_PATH)).json(parameters);
        let ack = self.send(request).await?.text().await?;
        debug!(%ack, "start acknowledged");
        Ok(ack)
    }

    async fn stop(&self) -> Result<SimulationDetails> {
        debug!("posting stop request");
        self.snapshot(self.http.post(self.endpoint(STOP_PATH))).await
    }

    async fn fetch_details(&self) -> Result<SimulationDetails> {
        debug!("fetching details");
        let request = self
            .http
            .get(self.endpoint(DETAILS_PATH))
            .header(ACCEPT, "application/json");
        self.snapshot(request).await
    }

    fn details_stream(&self) -> DetailsStream {
        let request = self
            .http
            .get(self.endpoint(DETAILS_PATH))
            .header(ACCEPT, "text/event-stream");
        debug!(url = %self.endpoint(DETAILS_PATH), "opening push channel");
        event_stream(request)
    }
}

enum Feed {
    Connect(RequestBuilder),
    Open {
        chunks: BoxStream<'static, reqwest::Result<Vec<u8>>>,
        parser: SseStreamParser,
        queued: VecDeque<String>,
    },
    Done,
}

fn event_stream(request: RequestBuilder) -> DetailsStream {
    stream::unfold(Feed::Connect(request), |mut feed| async move {
        loop {
            feed = match feed {
                Feed::Connect(request) => match request.send().await {
                    Ok(response) if response.status().is_success() => Feed::Open {
                        chunks: response
                            .bytes_stream()
                            .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
                            .boxed(),
                        parser: SseStreamParser::default(),
                        queued: VecDeque::new(),
                    },
                    Ok(response) => return Some((Err(server_error(response).await), Feed::Done)),
                    Err(err) => return Some((Err(Error::Transport(err)), Feed::Done)),
                },
                Feed::Open {
                    mut chunks,
                    mut parser,
                    mut queued,
                } => {
                    if let Some(payload) = queued.pop_front() {
                        let next = Feed::Open {
                            chunks,
                            parser,
                            queued,
                        };
                        match serde_json::from_str::<SimulationDetails>(&payload) {
                            Ok(patch) => return Some((Ok(patch), next)),
                            Err(err) => {
                                warn!(%err, %payload, "skipping malformed push message");
                                next
                            }
                        }
                    } else {
                        match chunks.next().await {
                            Some(Ok(bytes)) => {
                                queued.extend(parser.feed(&bytes));
                                Feed::Open {
                                    chunks,
                                    parser,
                                    queued,
                                }
                            }
                            Some(Err(err)) => return Some((Err(Error::Transport(err)), Feed::Done)),
                            None => return None,
                        }
                    }
                }
                Feed::Done => return None,
            };
        }
    })
    .boxed()
}

async fn server_error(response: Response) -> Error {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Error::Server {
        status,
        message: parse_error_message(&body),
    }
}

pub fn parse_error_message(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|parsed| parsed.message)
        .filter(|message| !message.is_empty())
}
