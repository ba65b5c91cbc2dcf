use serde::{Deserialize, Serialize};

const TRANSPORT_KEYWORDS: &[&str] =
    &["cab", "taxi", "ride", "car", "shuttle", "transfer", "movers", "moving", "tempo", "truck"];

/// What the requester wants negotiated. Every field is optional so partial
/// updates can be merged as the requester fills the form in.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceRequirements {
    #[serde(alias = "service")]
    pub service_type: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub passengers: Option<u32>,
    pub vehicle_type: Option<String>,
    pub extras: Vec<String>,
    pub preferred_vendors: Vec<String>,
}

impl ServiceRequirements {
    /// Field-wise merge: populated fields in `update` replace ours, non-empty
    /// lists replace ours wholesale.
    pub fn merge(&mut self, update: ServiceRequirements) {
        merge_field(&mut self.service_type, update.service_type);
        merge_field(&mut self.from, update.from);
        merge_field(&mut self.to, update.to);
        merge_field(&mut self.date, update.date);
        merge_field(&mut self.time, update.time);
        if update.passengers.is_some() {
            self.passengers = update.passengers;
        }
        merge_field(&mut self.vehicle_type, update.vehicle_type);
        if !update.extras.is_empty() {
            self.extras = update.extras;
        }
        if !update.preferred_vendors.is_empty() {
            self.preferred_vendors = update.preferred_vendors;
        }
    }

    pub fn is_transport(&self) -> bool {
        let Some(service) = self.service_type.as_deref() else {
            return false;
        };
        let service = service.to_ascii_lowercase();
        service
            .split(|ch: char| !ch.is_ascii_alphanumeric())
            .any(|word| TRANSPORT_KEYWORDS.contains(&word))
    }

    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if is_blank(&self.service_type) {
            missing.push("service_type");
        }
        if is_blank(&self.from) {
            missing.push("from");
        }
        if self.is_transport() && is_blank(&self.to) {
            missing.push("to");
        }
        if is_blank(&self.date) {
            missing.push("date");
        }
        missing
    }

    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }

    pub fn service_label(&self) -> &str {
        self.service_type.as_deref().unwrap_or("service")
    }

    /// Single-line description used in prompts, call briefs and call records.
    pub fn describe(&self) -> String {
        let mut parts = vec![self.service_label().to_string()];
        if let Some(from) = &self.from {
            parts.push(format!("from {from}"));
        }
        if let Some(to) = &self.to {
            parts.push(format!("to {to}"));
        }
        if let Some(date) = &self.date {
            parts.push(format!("on {date}"));
        }
        if let Some(time) = &self.time {
            parts.push(format!("at {time}"));
        }
        if let Some(passengers) = self.passengers {
            parts.push(format!("for {passengers} passenger(s)"));
        }
        if let Some(vehicle) = &self.vehicle_type {
            parts.push(format!("vehicle: {vehicle}"));
        }
        if !self.extras.is_empty() {
            parts.push(format!("notes: {}", self.extras.join("; ")));
        }
        parts.join(" ")
    }
}

fn merge_field(target: &mut Option<String>, update: Option<String>) {
    if let Some(value) = update {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            *target = Some(trimmed.to_string());
        }
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map(str::trim).map_or(true, str::is_empty)
}
