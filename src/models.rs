use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SimulationParameters {
    pub total_tickets: u64,
    pub ticket_release_rate: u64,
    pub customer_retrieval_rate: u64,
    pub max_ticket_capacity: u64,
    pub num_vendors: u64,
    pub num_customers: u64,
}

impl Default for SimulationParameters {
    fn default() -> Self {
        Self {
            total_tickets: 100,
            ticket_release_rate: 1000,
            customer_retrieval_rate: 2000,
            max_ticket_capacity: 50,
            num_vendors: 3,
            num_customers: 5,
        }
    }
}

impl SimulationParameters {
    pub fn get(&self, field: Field) -> u64 {
        match field {
            Field::TotalTickets => self.total_tickets,
            Field::TicketReleaseRate => self.ticket_release_rate,
            Field::CustomerRetrievalRate => self.customer_retrieval_rate,
            Field::MaxTicketCapacity => self.max_ticket_capacity,
            Field::NumVendors => self.num_vendors,
            Field::NumCustomers => self.num_customers,
        }
    }

    pub fn set(&mut self, field: Field, value: u64) {
        let slot = match field {
            Field::TotalTickets => &mut self.total_tickets,
            Field::TicketReleaseRate => &mut self.ticket_release_rate,
            Field::CustomerRetrievalRate => &mut self.customer_retrieval_rate,
            Field::MaxTicketCapacity => &mut self.max_ticket_capacity,
            Field::NumVendors => &mut self.num_vendors,
            Field::NumCustomers => &mut self.num_customers,
        };
        *slot = value;
    }

    pub fn all_positive(&self) -> bool {
        Field::ALL.iter().all(|field| self.get(*field) > 0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Field {
    TotalTickets,
    TicketReleaseRate,
    CustomerRetrievalRate,
    MaxTicketCapacity,
    NumVendors,
    NumCustomers,
}

impl Field {
    pub const ALL: [Field; 6] = [
        Field::TotalTickets,
        Field::TicketReleaseRate,
        Field::CustomerRetrievalRate,
        Field::MaxTicketCapacity,
        Field::NumVendors,
        Field::NumCustomers,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Field::TotalTickets => "totalTickets",
            Field::TicketReleaseRate => "ticketReleaseRate",
            Field::CustomerRetrievalRate => "customerRetrievalRate",
            Field::MaxTicketCapacity => "maxTicketCapacity",
            Field::NumVendors => "numVendors",
            Field::NumCustomers => "numCustomers",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Field::TotalTickets => "Total Tickets",
            Field::TicketReleaseRate => "Ticket Release Rate (ms)",
            Field::CustomerRetrievalRate => "Customer Retrieval Rate (ms)",
            Field::MaxTicketCapacity => "Max Ticket Capacity",
            Field::NumVendors => "Number of Vendors",
            Field::NumCustomers => "Number of Customers",
        }
    }

    fn flag(self) -> &'static str {
        match self {
            Field::TotalTickets => "total-tickets",
            Field::TicketReleaseRate => "ticket-release-rate",
            Field::CustomerRetrievalRate => "customer-retrieval-rate",
            Field::MaxTicketCapacity => "max-ticket-capacity",
            Field::NumVendors => "num-vendors",
            Field::NumCustomers => "num-customers",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Field {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        Field::ALL
            .iter()
            .copied()
            .find(|field| field.name() == value || field.flag() == value)
            .ok_or_else(|| format!("unknown parameter '{}'", value))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor_tickets_added: Option<BTreeMap<i64, u64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_tickets_retrieved: Option<BTreeMap<i64, u64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tickets_remaining: Option<i64>,
}

impl SimulationDetails {
    pub fn merge(&mut self, patch: SimulationDetails) {
        if patch.execution_time.is_some() {
            self.execution_time = patch.execution_time;
        }
        if patch.vendor_tickets_added.is_some() {
            self.vendor_tickets_added = patch.vendor_tickets_added;
        }
        if patch.customer_tickets_retrieved.is_some() {
            self.customer_tickets_retrieved = patch.customer_tickets_retrieved;
        }
        if patch.tickets_remaining.is_some() {
            self.tickets_remaining = patch.tickets_remaining;
        }
    }

    pub fn merged(previous: Option<&SimulationDetails>, patch: SimulationDetails) -> Self {
        let mut next = previous.cloned().unwrap_or_default();
        next.merge(patch);
        next
    }
}
