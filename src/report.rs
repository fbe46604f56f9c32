//! Trip report aggregation.
//!
//! A report anchors on the canonical list of counterparts (every polygon, or every
//! contractor) so that counterparts without any activity still show up with a zero count.
//! Sparse per-counterpart counts are merged into that list, then each group gets its
//! detail rows.
use super::context::RequestContext;
use super::error::ActError;
use super::ledger::{ReportLedger, TripWindow};
use super::model::Organization;
use super::principal::{AccessPolicy, Action, Role};
use super::renderer::ReportRenderer;
use super::types::{CalendarDay, Id, TimeStamp};
use super::utils::sanitize_file_name;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportMode {
    /// Target is a contractor, groups are polygons.
    Contractor,
    /// Target is a polygon, groups are contractors.
    Landfill,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TripDetail {
    pub id: Id,
    pub entry_at: TimeStamp,
    pub exit_at: Option<TimeStamp>,
    pub status: String,
    pub polygon_id: Option<Id>,
    pub polygon_name: Option<String>,
    pub contractor_id: Option<Id>,
    pub contractor_name: Option<String>,
    pub vehicle_plate_number: Option<String>,
    pub detected_plate_number: Option<String>,
    pub detected_volume_entry: Option<f64>,
    pub detected_volume_exit: Option<f64>,
    pub total_volume_m3: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TripGroup {
    pub id: Option<Id>,
    pub name: String,
    pub trip_count: i64,
    pub trips: Vec<TripDetail>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActReport {
    pub mode: ReportMode,
    pub target: Organization,
    pub period_start: CalendarDay,
    pub period_end: CalendarDay,
    pub total_trips: i64,
    pub groups: Vec<TripGroup>,
}

#[derive(Debug, Clone)]
pub struct ReportRequest {
    pub mode: ReportMode,
    pub target_id: Option<Id>,
    pub period_start: Option<DateTime<Utc>>,
    pub period_end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct ReportResult {
    pub file_name: String,
    pub content: Vec<u8>,
    pub report: ActReport,
}

pub struct ReportService<L, R> {
    ledger: L,
    renderer: R,
    policy: AccessPolicy,
    valid_statuses: Vec<String>,
}

impl ReportMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportMode::Contractor => "CONTRACTOR",
            ReportMode::Landfill => "LANDFILL",
        }
    }
}

impl fmt::Display for ReportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportMode {
    type Err = ActError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "contractor" => Ok(ReportMode::Contractor),
            "landfill" => Ok(ReportMode::Landfill),
            _ => Err(ActError::invalid("invalid mode")),
        }
    }
}

impl TripDetail {
    pub fn plate(&self) -> Option<&str> {
        self.detected_plate_number
            .as_deref()
            .or(self.vehicle_plate_number.as_deref())
    }
}

impl TripGroup {
    pub fn new(id: Option<Id>, name: impl Into<String>, trip_count: i64) -> Self {
        Self {
            id,
            name: name.into(),
            trip_count,
            trips: vec![],
        }
    }

    pub fn total_volume(&self) -> f64 {
        self.trips.iter().filter_map(|t| t.total_volume_m3).sum()
    }
}

impl ActReport {
    /// `act-report-{mode}-{target}-{start}-{end}.{ext}`, target falling back to its id.
    pub fn file_name(&self, extension: &str) -> String {
        let mut target = sanitize_file_name(&self.target.name);
        if target.is_empty() {
            target = self.target.id.to_string();
        }
        format!(
            "act-report-{}-{}-{}-{}.{}",
            self.mode.as_str().to_lowercase(),
            target,
            self.period_start.compact(),
            self.period_end.compact(),
            extension
        )
    }
}

/// Folds activity rows into the canonical list.
///
/// Every canonical entry appears exactly once. A count row with the same id replaces the
/// count (and fills a missing name); rows with no canonical match are appended in the order
/// they first appear.
pub fn merge_groups(canonical: Vec<TripGroup>, counted: Vec<TripGroup>) -> Vec<TripGroup> {
    let mut groups = canonical;
    let mut index: HashMap<Id, usize> = HashMap::new();
    for (pos, group) in groups.iter().enumerate() {
        if let Some(id) = group.id {
            index.entry(id).or_insert(pos);
        }
    }

    for row in counted {
        let slot = row.id.and_then(|id| index.get(&id).copied());
        match slot {
            Some(pos) => {
                let group = &mut groups[pos];
                group.trip_count = row.trip_count;
                if group.name.is_empty() {
                    group.name = row.name;
                }
            }
            None => {
                if let Some(id) = row.id {
                    index.insert(id, groups.len());
                }
                groups.push(row);
            }
        }
    }

    groups
}

impl<L, R> ReportService<L, R>
where
    L: ReportLedger,
    R: ReportRenderer,
{
    pub fn new(ledger: L, renderer: R, policy: AccessPolicy, valid_statuses: Vec<String>) -> Self {
        Self {
            ledger,
            renderer,
            policy,
            valid_statuses,
        }
    }

    pub fn generate_report(
        &self,
        ctx: &RequestContext,
        request: ReportRequest,
    ) -> Result<ReportResult, ActError> {
        let report = self.build_report(ctx, request)?;
        let content = self.renderer.render(&report).map_err(|e| {
            error!(mode = %report.mode, target = %report.target.id, error = %e, "report rendering failed");
            ActError::Render(e)
        })?;
        let file_name = report.file_name(self.renderer.file_extension());

        Ok(ReportResult {
            file_name,
            content,
            report,
        })
    }

    /// Validates the request and assembles the report without rendering it.
    pub fn build_report(
        &self,
        ctx: &RequestContext,
        request: ReportRequest,
    ) -> Result<ActReport, ActError> {
        let principal = &ctx.principal;
        if !self.policy.permits(principal.role, Action::Report(request.mode)) {
            return Err(ActError::PermissionDenied);
        }

        let target_id = request
            .target_id
            .ok_or_else(|| ActError::invalid("target_id is required"))?;
        let (Some(start), Some(end)) = (request.period_start, request.period_end) else {
            return Err(ActError::invalid("period dates are required"));
        };
        if request.mode == ReportMode::Contractor
            && principal.is(Role::Contractor)
            && principal.org_id != target_id
        {
            return Err(ActError::PermissionDenied);
        }
        if start > end {
            return Err(ActError::invalid(
                "period_start must be before or equal to period_end",
            ));
        }

        let period_start = TimeStamp::from(start).day();
        let period_end = TimeStamp::from(end).day();
        let window = TripWindow::for_days(period_start, period_end)
            .ok_or_else(|| ActError::invalid("period_end is out of range"))?;

        let result = self.assemble(ctx, request.mode, &target_id, &window);
        let (target, groups) = result.inspect_err(|e| {
            if let ActError::Ledger(inner) = e {
                error!(mode = %request.mode, target = %target_id, error = %inner, "report query failed");
            }
        })?;
        let total_trips = groups.iter().map(|g| g.trip_count).sum();

        info!(
            mode = %request.mode,
            target = %target_id,
            groups = groups.len(),
            total_trips,
            "report built"
        );

        Ok(ActReport {
            mode: request.mode,
            target,
            period_start,
            period_end,
            total_trips,
            groups,
        })
    }

    fn assemble(
        &self,
        ctx: &RequestContext,
        mode: ReportMode,
        target_id: &Id,
        window: &TripWindow,
    ) -> Result<(Organization, Vec<TripGroup>), ActError> {
        ctx.ensure_active()?;
        let target = match mode {
            ReportMode::Contractor => self.ledger.get_organization(target_id)?,
            ReportMode::Landfill => self.ledger.get_polygon(target_id)?.map(|p| Organization {
                name: p.name,
                kind: "POLYGON".to_string(),
                ..Organization::placeholder(p.id)
            }),
        }
        .ok_or(ActError::NotFound)?;

        ctx.ensure_active()?;
        let canonical = match mode {
            ReportMode::Contractor => self.ledger.list_polygons()?,
            ReportMode::Landfill => self.ledger.list_contractors()?,
        };

        ctx.ensure_active()?;
        let counted = self
            .ledger
            .event_counts(mode, target_id, window, &self.valid_statuses)?;

        let mut groups = merge_groups(canonical, counted);

        for group in groups.iter_mut() {
            let Some(counterpart) = group.id else {
                continue;
            };
            ctx.ensure_active()?;
            group.trips = self.ledger.event_details(
                mode,
                target_id,
                &counterpart,
                window,
                &self.valid_statuses,
            )?;
        }

        Ok((target, groups))
    }
}
