use tracing::{info, warn};

use crate::error::{Error, Operation, Result};
use crate::models::{Field, SimulationParameters};
use crate::service::SimulationService;

#[derive(Clone, Debug, Default)]
pub struct ParameterForm {
    draft: SimulationParameters,
    error: Option<String>,
}

impl ParameterForm {
    pub fn new(initial: SimulationParameters) -> Self {
        Self {
            draft: initial,
            error: None,
        }
    }

    pub fn draft(&self) -> &SimulationParameters {
        &self.draft
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn edit(&mut self, field: Field, input: &str) -> Result<()> {
        match parse_value(input) {
            Some(value) => {
                self.draft.set(field, value);
                self.error = None;
                Ok(())
            }
            None => {
                let err = Error::InvalidField(field);
                self.error = Some(err.to_string());
                Err(err)
            }
        }
    }

    pub fn validate(&mut self) -> Result<SimulationParameters> {
        if self.draft.all_positive() {
            Ok(self.draft)
        } else {
            self.error = Some(Error::NonPositiveParameters.to_string());
            Err(Error::NonPositiveParameters)
        }
    }

    pub async fn submit<S: SimulationService>(&mut self, service: &S) -> Result<SimulationParameters> {
        let parameters = self.validate()?;
        match service.start(&parameters).await {
            Ok(_) => {
                info!(?parameters, "simulation started");
                Ok(parameters)
            }
            Err(err) => {
                let message = Operation::Start.describe(&err);
                warn!(%err, "start request failed");
                self.error = Some(message);
                Err(Error::failed(Operation::Start, err))
            }
        }
    }
}

fn parse_value(input: &str) -> Option<u64> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Some(0);
    }
    if let Ok(value) = trimmed.parse::<u64>() {
        return Some(value);
    }
    let value = trimmed.parse::<f64>().ok()?;
    if value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value <= u64::MAX as f64 {
        Some(value as u64)
    } else {
        None
    }
}
