use futures_util::StreamExt;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Operation, Result};
use crate::models::{SimulationDetails, SimulationParameters};
use crate::service::{DetailsStream, SimulationService};
use crate::state::{PushStatusRule, SessionState, SessionStatus};

#[derive(Clone, Debug, PartialEq)]
pub enum PushEvent {
    Merged,
    ChannelFailed(String),
    ChannelClosed,
}

struct PushChannel {
    id: u64,
    stream: DetailsStream,
}

#[derive(Clone, Debug, Serialize)]
pub struct SessionView<'a> {
    pub status: SessionStatus,
    pub details: Option<&'a SimulationDetails>,
    pub error: Option<&'a str>,
    pub can_stop: bool,
    pub can_fetch: bool,
}

pub struct SessionClient<S> {
    service: S,
    parameters: SimulationParameters,
    state: SessionState,
    channel: Option<PushChannel>,
    channels_opened: u64,
    error: Option<String>,
    push_rule: PushStatusRule,
}

impl<S: SimulationService> SessionClient<S> {
    pub fn new(service: S, parameters: SimulationParameters) -> Self {
        Self {
            service,
            parameters,
            state: SessionState::new(),
            channel: None,
            channels_opened: 0,
            error: None,
            push_rule: PushStatusRule::default(),
        }
    }

    pub fn with_push_rule(mut self, push_rule: PushStatusRule) -> Self {
        self.push_rule = push_rule;
        self
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn parameters(&self) -> &SimulationParameters {
        &self.parameters
    }

    pub fn status(&self) -> SessionStatus {
        self.state.status()
    }

    pub fn details(&self) -> Option<&SimulationDetails> {
        self.state.details()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn channel_id(&self) -> Option<u64> {
        self.channel.as_ref().map(|channel| channel.id)
    }

    pub fn view(&self) -> SessionView<'_> {
        SessionView {
            status: self.state.status(),
            details: self.state.details(),
            error: self.error.as_deref(),
            can_stop: self.state.can_stop(),
            can_fetch: self.state.can_fetch(),
        }
    }

    pub fn attach(&mut self) {
        self.open_channel();
    }

    pub fn start(&mut self, parameters: SimulationParameters) {
        info!(?parameters, "session starting");
        self.parameters = parameters;
        self.state.begin_run();
        self.open_channel();
    }

    pub async fn stop(&mut self) -> Result<()> {
        if !self.state.can_stop() {
            return Err(Error::Unavailable(Operation::Stop, self.state.status()));
        }
        match self.service.stop().await {
            Ok(snapshot) => {
                info!(tickets_remaining = ?snapshot.tickets_remaining, "simulation stopped");
                self.state.replace_snapshot(snapshot);
                self.error = None;
                Ok(())
            }
            Err(err) => Err(self.record_failure(Operation::Stop, err)),
        }
    }

    pub async fn fetch(&mut self) -> Result<()> {
        if !self.state.can_fetch() {
            return Err(Error::Unavailable(Operation::Fetch, self.state.status()));
        }
        match self.service.fetch_details().await {
            Ok(snapshot) => {
                debug!("details fetched");
                self.state.replace_snapshot(snapshot);
                Ok(())
            }
            Err(err) => Err(self.record_failure(Operation::Fetch, err)),
        }
    }

    pub fn reconcile(&mut self, details: SimulationDetails) -> bool {
        self.state.reconcile(details)
    }

    pub async fn next_push(&mut self) -> PushEvent {
        let Some(channel) = self.channel.as_mut() else {
            return std::future::pending().await;
        };
        match channel.stream.next().await {
            Some(Ok(patch)) => {
                self.state.merge_push(patch, self.push_rule);
                PushEvent::Merged
            }
            Some(Err(err)) => {
                error!(%err, "push channel failed");
                self.close_channel();
                PushEvent::ChannelFailed(err.to_string())
            }
            None => {
                info!("push channel ended");
                self.close_channel();
                PushEvent::ChannelClosed
            }
        }
    }

    pub fn close(&mut self) {
        self.close_channel();
    }

    fn open_channel(&mut self) {
        self.close_channel();
        if self.parameters.total_tickets == 0 {
            debug!("no tickets configured; push channel not opened");
            return;
        }
        self.channels_opened += 1;
        debug!(id = self.channels_opened, "push channel opened");
        self.channel = Some(PushChannel {
            id: self.channels_opened,
            stream: self.service.details_stream(),
        });
    }

    fn record_failure(&mut self, operation: Operation, err: Error) -> Error {
        let message = operation.describe(&err);
        warn!(%err, %operation, "request failed");
        self.error = Some(message);
        Error::failed(operation, err)
    }
}

impl<S> SessionClient<S> {
    fn close_channel(&mut self) {
        if let Some(channel) = self.channel.take() {
            debug!(id = channel.id, "push channel closed");
        }
    }
}

impl<S> Drop for SessionClient<S> {
    fn drop(&mut self) {
        self.close_channel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::collections::{BTreeMap, VecDeque};
    use std::pin::Pin;
    use std::rc::Rc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::task::{Context, Poll};

    use futures_util::Stream;

    #[derive(Default)]
    struct Live {
        open: AtomicUsize,
        peak: AtomicUsize,
    }

    struct ScriptedStream {
        items: VecDeque<Result<SimulationDetails>>,
        live: Arc<Live>,
    }

    impl Stream for ScriptedStream {
        type Item = Result<SimulationDetails>;

        fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
            Poll::Ready(self.get_mut().items.pop_front())
        }
    }

    impl Drop for ScriptedStream {
        fn drop(&mut self) {
            self.live.open.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct MockService {
        pushes: RefCell<VecDeque<Vec<Result<SimulationDetails>>>>,
        stop_result: RefCell<Option<Result<SimulationDetails>>>,
        fetch_result: RefCell<Option<Result<SimulationDetails>>>,
        stop_calls: Cell<usize>,
        fetch_calls: Cell<usize>,
        streams_opened: Cell<usize>,
        live: Arc<Live>,
    }

    impl MockService {
        fn with_pushes(pushes: Vec<Vec<Result<SimulationDetails>>>) -> Self {
            Self {
                pushes: RefCell::new(pushes.into()),
                ..Self::default()
            }
        }
    }

    impl SimulationService for Rc<MockService> {
        async fn start(&self, _parameters: &SimulationParameters) -> Result<String> {
            Ok(String::new())
        }

        async fn stop(&self) -> Result<SimulationDetails> {
            self.stop_calls.set(self.stop_calls.get() + 1);
            self.stop_result
                .borrow_mut()
                .take()
                .unwrap_or_else(|| Ok(SimulationDetails::default()))
        }

        async fn fetch_details(&self) -> Result<SimulationDetails> {
            self.fetch_calls.set(self.fetch_calls.get() + 1);
            self.fetch_result
                .borrow_mut()
                .take()
                .unwrap_or_else(|| Ok(SimulationDetails::default()))
        }

        fn details_stream(&self) -> DetailsStream {
            self.streams_opened.set(self.streams_opened.get() + 1);
            let open = self.live.open.fetch_add(1, Ordering::SeqCst) + 1;
            self.live.peak.fetch_max(open, Ordering::SeqCst);
            let items = self.pushes.borrow_mut().pop_front().unwrap_or_default();
            Box::pin(ScriptedStream {
                items: items.into(),
                live: Arc::clone(&self.live),
            })
        }
    }

    fn remaining(count: i64) -> SimulationDetails {
        SimulationDetails {
            tickets_remaining: Some(count),
            ..SimulationDetails::default()
        }
    }

    fn client(mock: &Rc<MockService>) -> SessionClient<Rc<MockService>> {
        SessionClient::new(Rc::clone(mock), SimulationParameters::default())
    }

    #[tokio::test]
    async fn pushes_merge_into_union() {
        let mock = Rc::new(MockService::with_pushes(vec![vec![
            Ok(remaining(1)),
            Ok(SimulationDetails {
                execution_time: Some(2.0),
                ..SimulationDetails::default()
            }),
        ]]));
        let mut session = client(&mock);
        session.start(SimulationParameters::default());

        assert_eq!(session.next_push().await, PushEvent::Merged);
        assert_eq!(session.next_push().await, PushEvent::Merged);
        let details = session.details().unwrap();
        assert_eq!(details.tickets_remaining, Some(1));
        assert_eq!(details.execution_time, Some(2.0));
        assert_eq!(session.status(), SessionStatus::Stopped);
    }

    #[tokio::test]
    async fn stop_is_refused_unless_running() {
        let mock = Rc::new(MockService::default());
        let mut session = client(&mock);
        let err = session.stop().await.unwrap_err();
        assert!(matches!(err, Error::Unavailable(Operation::Stop, SessionStatus::Idle)));
        assert_eq!(mock.stop_calls.get(), 0);
    }

    #[tokio::test]
    async fn stop_replaces_pushed_details_with_snapshot() {
        let snapshot = SimulationDetails {
            tickets_remaining: Some(0),
            vendor_tickets_added: Some(BTreeMap::from([(1, 10)])),
            ..SimulationDetails::default()
        };
        let mock = Rc::new(MockService::with_pushes(vec![vec![Ok(SimulationDetails {
            execution_time: Some(5.0),
            customer_tickets_retrieved: Some(BTreeMap::from([(4, 4)])),
            ..SimulationDetails::default()
        })]]));
        *mock.stop_result.borrow_mut() = Some(Ok(snapshot.clone()));
        let mut session =
            client(&mock).with_push_rule(PushStatusRule::KeepRunning);
        session.start(SimulationParameters::default());
        assert_eq!(session.next_push().await, PushEvent::Merged);
        assert_eq!(session.status(), SessionStatus::Running);

        session.stop().await.unwrap();
        assert_eq!(session.status(), SessionStatus::Stopped);
        assert_eq!(session.details(), Some(&snapshot));
        assert_eq!(mock.stop_calls.get(), 1);
    }

    #[tokio::test]
    async fn failed_stop_keeps_state_and_records_message() {
        let mock = Rc::new(MockService::default());
        *mock.stop_result.borrow_mut() = Some(Err(Error::Server {
            status: 500,
            message: None,
        }));
        let mut session = client(&mock);
        session.start(SimulationParameters::default());
        let err = session.stop().await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to stop simulation: Unknown error");
        assert_eq!(session.error(), Some("Failed to stop simulation: Unknown error"));
        assert_eq!(session.status(), SessionStatus::Running);
    }

    #[tokio::test]
    async fn successful_stop_clears_previous_error() {
        let mock = Rc::new(MockService::default());
        *mock.stop_result.borrow_mut() = Some(Err(Error::Unexpected("bad".into())));
        let mut session = client(&mock);
        session.start(SimulationParameters::default());
        assert!(session.stop().await.is_err());
        assert_eq!(session.error(), Some("Failed to stop simulation"));
        session.stop().await.unwrap();
        assert_eq!(session.error(), None);
    }

    #[tokio::test]
    async fn fetch_is_refused_while_running() {
        let mock = Rc::new(MockService::default());
        let mut session = client(&mock);
        session.start(SimulationParameters::default());
        let err = session.fetch().await.unwrap_err();
        assert!(matches!(err, Error::Unavailable(Operation::Fetch, SessionStatus::Running)));
        assert_eq!(mock.fetch_calls.get(), 0);
    }

    #[tokio::test]
    async fn fetch_replaces_details_when_idle() {
        let mock = Rc::new(MockService::default());
        *mock.fetch_result.borrow_mut() = Some(Ok(remaining(12)));
        let mut session = client(&mock);
        session.fetch().await.unwrap();
        assert_eq!(session.status(), SessionStatus::Stopped);
        assert_eq!(session.details(), Some(&remaining(12)));
    }

    #[tokio::test]
    async fn failed_fetch_reports_message() {
        let mock = Rc::new(MockService::default());
        *mock.fetch_result.borrow_mut() = Some(Err(Error::Server {
            status: 404,
            message: Some("no simulation".into()),
        }));
        let mut session = client(&mock);
        assert!(session.fetch().await.is_err());
        assert_eq!(session.error(), Some("Failed to fetch details: no simulation"));
        assert_eq!(session.status(), SessionStatus::Idle);
    }

    #[test]
    fn restart_closes_previous_channel_first() {
        let mock = Rc::new(MockService::default());
        let mut session = client(&mock);
        session.attach();
        session.start(SimulationParameters {
            total_tickets: 10,
            ..SimulationParameters::default()
        });
        session.start(SimulationParameters {
            total_tickets: 20,
            ..SimulationParameters::default()
        });
        assert_eq!(mock.streams_opened.get(), 3);
        assert_eq!(mock.live.peak.load(Ordering::SeqCst), 1);
        assert_eq!(mock.live.open.load(Ordering::SeqCst), 1);
        assert_eq!(session.channel_id(), Some(3));

        drop(session);
        assert_eq!(mock.live.open.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn zero_tickets_opens_no_channel() {
        let mock = Rc::new(MockService::default());
        let mut session = client(&mock);
        session.attach();
        session.start(SimulationParameters {
            total_tickets: 0,
            ..SimulationParameters::default()
        });
        assert_eq!(session.channel_id(), None);
        assert_eq!(mock.live.open.load(Ordering::SeqCst), 0);
        assert_eq!(session.status(), SessionStatus::Running);
    }

    #[tokio::test]
    async fn channel_error_closes_without_reconnect() {
        let mock = Rc::new(MockService::with_pushes(vec![vec![
            Ok(remaining(3)),
            Err(Error::PushChannel("reset".into())),
            Ok(remaining(1)),
        ]]));
        let mut session = client(&mock);
        session.attach();
        assert_eq!(session.next_push().await, PushEvent::Merged);
        assert!(matches!(session.next_push().await, PushEvent::ChannelFailed(_)));
        assert_eq!(session.channel_id(), None);
        assert_eq!(mock.streams_opened.get(), 1);
        assert_eq!(session.details().unwrap().tickets_remaining, Some(3));
    }

    #[tokio::test]
    async fn stream_end_closes_channel() {
        let mock = Rc::new(MockService::with_pushes(vec![vec![]]));
        let mut session = client(&mock);
        session.attach();
        assert_eq!(session.next_push().await, PushEvent::ChannelClosed);
        assert_eq!(session.channel_id(), None);
        assert_eq!(mock.live.open.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn reconcile_marks_stopped_once_per_value() {
        let mock = Rc::new(MockService::default());
        let mut session = client(&mock);
        session.start(SimulationParameters::default());
        assert!(session.reconcile(remaining(2)));
        assert_eq!(session.status(), SessionStatus::Stopped);
        assert!(!session.reconcile(remaining(2)));
    }

    #[test]
    fn view_reflects_enablement() {
        let mock = Rc::new(MockService::default());
        let mut session = client(&mock);
        let view = session.view();
        assert!(!view.can_stop);
        assert!(view.can_fetch);
        session.start(SimulationParameters::default());
        let view = session.view();
        assert_eq!(view.status, SessionStatus::Running);
        assert!(view.can_stop);
        assert!(!view.can_fetch);
    }
}
