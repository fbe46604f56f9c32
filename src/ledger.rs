//! Gateway traits between the engines and the data store
use super::error::LedgerError;
use super::model::{Act, ActStatus, Contract, NewAct, Organization, Polygon, StatusUpdate, TripForAct};
use super::report::{ReportMode, TripDetail, TripGroup};
use super::types::{CalendarDay, Id};
use chrono::{DateTime, Utc};

/// Half-open `[from, until)` range over trip entry times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TripWindow {
    pub from: DateTime<Utc>,
    pub until: DateTime<Utc>,
}

impl TripWindow {
    /// Covers the inclusive calendar range `[start, end]`.
    pub fn for_days(start: CalendarDay, end: CalendarDay) -> Option<Self> {
        let until = end.succ()?;
        Some(Self {
            from: start.start_utc(),
            until: until.start_utc(),
        })
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from <= at && at < self.until
    }
}

/// Read access to organizations and polygons, shared by both engines.
pub trait Directory {
    fn get_organization(&self, id: &Id) -> Result<Option<Organization>, LedgerError>;
    fn get_polygon(&self, id: &Id) -> Result<Option<Polygon>, LedgerError>;
}

pub trait ActLedger: Directory {
    fn get_contract(&self, id: &Id) -> Result<Option<Contract>, LedgerError>;
    fn contract_polygon_ids(&self, contract_id: &Id) -> Result<Vec<Id>, LedgerError>;

    /// Unclaimed trips linked to the contract, ordered by entry time.
    fn list_trips_for_period(
        &self,
        contract_id: &Id,
        window: &TripWindow,
        statuses: &[String],
    ) -> Result<Vec<TripForAct>, LedgerError>;

    /// Unclaimed trips unloaded at any of the polygons, ordered by entry time.
    fn list_trips_for_landfill_contract(
        &self,
        contract_id: &Id,
        polygon_ids: &[Id],
        window: &TripWindow,
        statuses: &[String],
    ) -> Result<Vec<TripForAct>, LedgerError>;

    /// Sum of `amount_wo_vat` over every act of the contract.
    fn sum_acts(&self, contract_id: &Id) -> Result<f64, LedgerError>;

    /// Stores the act and claims every trip in one atomic unit.
    /// A taken act number or an already claimed trip aborts the whole unit.
    fn create_act(&self, act: NewAct, trip_ids: &[Id]) -> Result<Act, LedgerError>;

    fn get_act(&self, id: &Id) -> Result<Option<Act>, LedgerError>;
    /// Applies `update` only while the stored status is still `expected`, as one atomic step.
    fn update_act_status(
        &self,
        id: &Id,
        expected: ActStatus,
        update: StatusUpdate,
    ) -> Result<Act, LedgerError>;
    fn list_acts_for_landfill(
        &self,
        landfill_id: &Id,
        status: Option<ActStatus>,
    ) -> Result<Vec<Act>, LedgerError>;
}

pub trait ReportLedger: Directory {
    /// Every polygon, ordered by name, each with a zero count.
    fn list_polygons(&self) -> Result<Vec<TripGroup>, LedgerError>;
    /// Every non-test contractor organization, ordered by name, each with a zero count.
    fn list_contractors(&self) -> Result<Vec<TripGroup>, LedgerError>;

    /// Trip counts for `target` grouped by counterpart.
    fn event_counts(
        &self,
        mode: ReportMode,
        target: &Id,
        window: &TripWindow,
        statuses: &[String],
    ) -> Result<Vec<TripGroup>, LedgerError>;

    /// Trips between `target` and one counterpart, ordered by entry time.
    fn event_details(
        &self,
        mode: ReportMode,
        target: &Id,
        counterpart: &Id,
        window: &TripWindow,
        statuses: &[String],
    ) -> Result<Vec<TripDetail>, LedgerError>;
}
