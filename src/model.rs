//! Contracts, trips, acts and the organizations around them
use super::types::{CalendarDay, Id, TimeStamp};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, minicbor::Encode, minicbor::Decode)]
pub struct Organization {
    #[n(0)]
    pub id: Id,
    #[n(1)]
    pub name: String,
    #[n(2)]
    pub kind: String, // CONTRACTOR, LANDFILL, AKIMAT, KGU ...
    #[n(3)]
    pub bin: String, // tax identifier
    #[n(4)]
    pub head_full_name: String,
    #[n(5)]
    pub address: String,
    #[n(6)]
    pub phone: String,
}

/// A snow disposal site. Landfill-service contracts bill trips by polygon.
#[derive(Debug, Clone, PartialEq, minicbor::Encode, minicbor::Decode)]
pub struct Polygon {
    #[n(0)]
    pub id: Id,
    #[n(1)]
    pub name: String,
    #[n(2)]
    pub owner_org_id: Option<Id>,
}

/// Who the contract bills. The variant decides how eligible trips are selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub enum ContractKind {
    #[n(0)]
    ContractorService {
        #[n(0)]
        contractor_id: Id,
    },
    #[n(1)]
    LandfillService {
        #[n(0)]
        landfill_id: Id,
    },
}

#[derive(Debug, Clone, PartialEq, minicbor::Encode, minicbor::Decode)]
pub struct Contract {
    #[n(0)]
    pub id: Id,
    #[n(1)]
    pub kind: ContractKind,
    #[n(2)]
    pub customer_org_id: Id,
    #[n(3)]
    pub name: String,
    #[n(4)]
    pub price_per_m3: f64,
    #[n(5)]
    pub budget_total: f64,
    #[n(6)]
    pub start_at: CalendarDay,
    #[n(7)]
    pub end_at: CalendarDay,
}

/// A raw trip as recorded by the upstream detection pipeline.
#[derive(Debug, Clone, PartialEq, minicbor::Encode, minicbor::Decode)]
pub struct TripRecord {
    #[n(0)]
    pub id: Id,
    #[n(1)]
    pub contract_id: Option<Id>,
    #[n(2)]
    pub polygon_id: Option<Id>,
    #[n(3)]
    pub contractor_id: Option<Id>,
    #[n(4)]
    pub status: String,
    #[n(5)]
    pub entry_at: TimeStamp,
    #[n(6)]
    pub exit_at: Option<TimeStamp>,
    #[n(7)]
    pub vehicle_plate: Option<String>,
    #[n(8)]
    pub detected_plate: Option<String>,
    #[n(9)]
    pub detected_volume_entry: Option<f64>,
    #[n(10)]
    pub detected_volume_exit: Option<f64>,
}

/// A trip eligible for billing, with its volume already resolved for the contract type.
#[derive(Debug, Clone, PartialEq)]
pub struct TripForAct {
    pub id: Id,
    pub volume_m3: f64,
    pub entry_at: TimeStamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, minicbor::Encode, minicbor::Decode)]
pub enum ActStatus {
    #[n(0)]
    Generated,
    #[n(1)]
    PendingApproval,
    #[n(2)]
    Approved,
    #[n(3)]
    Rejected,
}

/// Act fields computed by the engine, before the ledger assigns an identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAct {
    pub contract_id: Id,
    pub contractor_id: Option<Id>,
    pub landfill_id: Option<Id>,
    pub act_number: String,
    pub act_date: CalendarDay,
    pub period_start: CalendarDay,
    pub period_end: CalendarDay,
    pub total_volume_m3: f64,
    pub price_per_m3: f64,
    pub amount_wo_vat: f64,
    pub vat_rate: f64,
    pub vat_amount: f64,
    pub amount_with_vat: f64,
    pub status: ActStatus,
    pub created_by_org_id: Id,
    pub created_by_user_id: Id,
    pub created_at: TimeStamp,
}

// Financial figures are fixed at creation. Only the status block changes afterwards.
#[derive(Debug, Clone, PartialEq, minicbor::Encode, minicbor::Decode)]
pub struct Act {
    #[n(0)]
    pub id: Id,
    #[n(1)]
    pub contract_id: Id,
    #[n(2)]
    pub contractor_id: Option<Id>,
    #[n(3)]
    pub landfill_id: Option<Id>,
    #[n(4)]
    pub act_number: String,
    #[n(5)]
    pub act_date: CalendarDay,
    #[n(6)]
    pub period_start: CalendarDay,
    #[n(7)]
    pub period_end: CalendarDay,
    #[n(8)]
    pub total_volume_m3: f64,
    #[n(9)]
    pub price_per_m3: f64,
    #[n(10)]
    pub amount_wo_vat: f64,
    #[n(11)]
    pub vat_rate: f64,
    #[n(12)]
    pub vat_amount: f64,
    #[n(13)]
    pub amount_with_vat: f64,
    #[n(14)]
    pub status: ActStatus,
    #[n(15)]
    pub rejection_reason: Option<String>,
    #[n(16)]
    pub approved_by_org_id: Option<Id>,
    #[n(17)]
    pub approved_by_user_id: Option<Id>,
    #[n(18)]
    pub approved_at: Option<TimeStamp>,
    #[n(19)]
    pub created_by_org_id: Id,
    #[n(20)]
    pub created_by_user_id: Id,
    #[n(21)]
    pub created_at: TimeStamp,
}

/// The status block written by an approval or rejection.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub status: ActStatus,
    pub rejection_reason: Option<String>,
    pub approved_by_org_id: Option<Id>,
    pub approved_by_user_id: Option<Id>,
    pub approved_at: Option<TimeStamp>,
}

/// Everything a renderer needs for the billing certificate. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ActDocument {
    pub act: Act,
    pub contract: Contract,
    pub counterparty: Organization,
    pub customer: Organization,
    pub work_description: String,
    pub paid_before: f64,
    pub budget_exceeded: bool,
}

impl Organization {
    /// Stand-in for an organization that could not be resolved.
    pub fn placeholder(id: Id) -> Self {
        Self {
            id,
            name: String::new(),
            kind: String::new(),
            bin: String::new(),
            head_full_name: String::new(),
            address: String::new(),
            phone: String::new(),
        }
    }
}

impl Contract {
    pub fn contractor_id(&self) -> Option<Id> {
        match self.kind {
            ContractKind::ContractorService { contractor_id } => Some(contractor_id),
            ContractKind::LandfillService { .. } => None,
        }
    }

    pub fn landfill_id(&self) -> Option<Id> {
        match self.kind {
            ContractKind::LandfillService { landfill_id } => Some(landfill_id),
            ContractKind::ContractorService { .. } => None,
        }
    }

    /// The organization the act is issued to.
    pub fn counterparty_id(&self) -> Id {
        match self.kind {
            ContractKind::ContractorService { contractor_id } => contractor_id,
            ContractKind::LandfillService { landfill_id } => landfill_id,
        }
    }

    pub fn requires_approval(&self) -> bool {
        matches!(self.kind, ContractKind::LandfillService { .. })
    }
}

impl TripRecord {
    /// Billable volume: entry volume for contractor billing, entry minus exit at a landfill.
    pub fn volume_for(&self, kind: &ContractKind) -> f64 {
        let entry = self.detected_volume_entry.unwrap_or(0.0);
        match kind {
            ContractKind::ContractorService { .. } => entry,
            ContractKind::LandfillService { .. } => entry - self.detected_volume_exit.unwrap_or(0.0),
        }
    }
}

impl NewAct {
    pub fn into_act(self, id: Id) -> Act {
        Act {
            id,
            contract_id: self.contract_id,
            contractor_id: self.contractor_id,
            landfill_id: self.landfill_id,
            act_number: self.act_number,
            act_date: self.act_date,
            period_start: self.period_start,
            period_end: self.period_end,
            total_volume_m3: self.total_volume_m3,
            price_per_m3: self.price_per_m3,
            amount_wo_vat: self.amount_wo_vat,
            vat_rate: self.vat_rate,
            vat_amount: self.vat_amount,
            amount_with_vat: self.amount_with_vat,
            status: self.status,
            rejection_reason: None,
            approved_by_org_id: None,
            approved_by_user_id: None,
            approved_at: None,
            created_by_org_id: self.created_by_org_id,
            created_by_user_id: self.created_by_user_id,
            created_at: self.created_at,
        }
    }
}

impl Act {
    pub fn apply(&mut self, update: StatusUpdate) {
        self.status = update.status;
        self.rejection_reason = update.rejection_reason;
        self.approved_by_org_id = update.approved_by_org_id;
        self.approved_by_user_id = update.approved_by_user_id;
        self.approved_at = update.approved_at;
    }
}

impl ActStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActStatus::Generated => "GENERATED",
            ActStatus::PendingApproval => "PENDING_APPROVAL",
            ActStatus::Approved => "APPROVED",
            ActStatus::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for ActStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("unknown act status: {0}")]
pub struct ParseStatusError(String);

impl FromStr for ActStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GENERATED" => Ok(ActStatus::Generated),
            "PENDING_APPROVAL" => Ok(ActStatus::PendingApproval),
            "APPROVED" => Ok(ActStatus::Approved),
            "REJECTED" => Ok(ActStatus::Rejected),
            _ => Err(ParseStatusError(s.trim().to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn landfill_trip_bills_net_volume() {
        let trip = TripRecord {
            id: Id::new(),
            contract_id: None,
            polygon_id: Some(Id::new()),
            contractor_id: None,
            status: "OK".into(),
            entry_at: TimeStamp::new(),
            exit_at: None,
            vehicle_plate: None,
            detected_plate: None,
            detected_volume_entry: Some(12.5),
            detected_volume_exit: Some(2.0),
        };

        let landfill = ContractKind::LandfillService { landfill_id: Id::new() };
        let contractor = ContractKind::ContractorService { contractor_id: Id::new() };

        assert_eq!(trip.volume_for(&landfill), 10.5);
        assert_eq!(trip.volume_for(&contractor), 12.5);
    }

    #[test]
    fn act_status_parses_case_insensitively() {
        assert_eq!("pending_approval".parse::<ActStatus>(), Ok(ActStatus::PendingApproval));
        assert_eq!(
            "archived".parse::<ActStatus>().unwrap_err().to_string(),
            "unknown act status: archived"
        );
    }
}
