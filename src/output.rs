use std::collections::BTreeMap;

use serde_json::json;

use crate::models::{Field, SimulationDetails, SimulationParameters};
use crate::session::SessionView;

pub trait Formatter {
    fn details(&self, details: &SimulationDetails) -> String;
    fn session(&self, view: &SessionView<'_>) -> String;
    fn parameters(&self, parameters: &SimulationParameters, endpoint: Option<&str>) -> String;
}

pub struct HumanFormatter;
pub struct JsonFormatter;

const COLUMN_WIDTH: usize = 14;

impl Formatter for HumanFormatter {
    fn details(&self, details: &SimulationDetails) -> String {
        let mut output = String::new();
        if let Some(execution_time) = details.execution_time {
            output.push_str(&format!("Execution Time: {}\n", execution_time));
        }
        write_table(
            &mut output,
            ("Vendor ID", "Tickets Added"),
            details.vendor_tickets_added.as_ref(),
        );
        write_table(
            &mut output,
            ("Customer ID", "Tickets Retrieved"),
            details.customer_tickets_retrieved.as_ref(),
        );
        match details.tickets_remaining {
            Some(remaining) => output.push_str(&format!("Tickets Remaining: {}\n", remaining)),
            None => output.push_str("Tickets Remaining: unknown\n"),
        }
        output
    }

    fn session(&self, view: &SessionView<'_>) -> String {
        let mut output = format!("Status: {}\n", view.status);
        if let Some(error) = view.error {
            output.push_str(error);
            output.push('\n');
        }
        let fetch_label = if view.details.is_some() {
            "refresh details"
        } else {
            "fetch simulation details"
        };
        output.push_str(&format!(
            "Actions: stop [{}], {} [{}]\n",
            availability(view.can_stop),
            fetch_label,
            availability(view.can_fetch)
        ));
        if let Some(details) = view.details {
            output.push_str(&self.details(details));
        }
        output
    }

    fn parameters(&self, parameters: &SimulationParameters, endpoint: Option<&str>) -> String {
        let mut output = endpoint
            .map(|endpoint| format!("Endpoint: {}\n", endpoint))
            .unwrap_or_default();
        for field in Field::ALL {
            output.push_str(&format!("{}: {}\n", field.label(), parameters.get(field)));
        }
        output
    }
}

impl Formatter for JsonFormatter {
    fn details(&self, details: &SimulationDetails) -> String {
        to_json(&json!(details))
    }

    fn session(&self, view: &SessionView<'_>) -> String {
        to_json(&json!(view))
    }

    fn parameters(&self, parameters: &SimulationParameters, endpoint: Option<&str>) -> String {
        to_json(&json!({
            "endpoint": endpoint,
            "parameters": parameters,
        }))
    }
}

fn write_table(output: &mut String, headers: (&str, &str), rows: Option<&BTreeMap<i64, u64>>) {
    output.push_str(&format!("{:<width$}{}\n", headers.0, headers.1, width = COLUMN_WIDTH));
    for (id, count) in rows.into_iter().flatten() {
        output.push_str(&format!("{:<width$}{}\n", id, count, width = COLUMN_WIDTH));
    }
}

fn availability(enabled: bool) -> &'static str {
    if enabled {
        "enabled"
    } else {
        "disabled"
    }
}

fn to_json(value: &serde_json::Value) -> String {
    let mut text = serde_json::to_string_pretty(value).unwrap_or_else(|_| "null".to_string());
    text.push('\n');
    text
}
