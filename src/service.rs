//! Act generation and the approval workflow
use super::clock::{Clock, SystemClock};
use super::config::ActsConfig;
use super::context::RequestContext;
use super::error::{ActError, LedgerError};
use super::ledger::{ActLedger, TripWindow};
use super::model::{
    Act, ActDocument, ActStatus, Contract, ContractKind, NewAct, Organization, StatusUpdate,
    TripForAct,
};
use super::principal::{AccessPolicy, Action, Principal, Role};
use super::renderer::ActRenderer;
use super::types::{Id, TimeStamp};
use super::utils::{ActAmounts, build_act_number, round, sanitize_file_name};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct GenerateActInput {
    pub contract_id: Id,
    pub period_start: Option<DateTime<Utc>>,
    pub period_end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct GenerateActResult {
    pub file_name: String,
    pub content: Vec<u8>,
    pub act: Act,
    pub budget_exceeded: bool,
}

pub struct ActService<L, R> {
    ledger: L,
    renderer: R,
    config: ActsConfig,
    policy: AccessPolicy,
    clock: Arc<dyn Clock>,
}

impl<L, R> ActService<L, R>
where
    L: ActLedger,
    R: ActRenderer,
{
    pub fn new(ledger: L, renderer: R, config: ActsConfig) -> Self {
        let policy = config.access_policy();
        Self {
            ledger,
            renderer,
            config,
            policy,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Selects unclaimed trips for the period, prices them and stores a new act claiming them.
    pub fn generate_act(
        &self,
        ctx: &RequestContext,
        input: GenerateActInput,
    ) -> Result<GenerateActResult, ActError> {
        let contract_id = input.contract_id;
        self.generate(ctx, input)
            .inspect_err(|e| log_unclassified("act generation", &contract_id, e))
    }

    fn generate(
        &self,
        ctx: &RequestContext,
        input: GenerateActInput,
    ) -> Result<GenerateActResult, ActError> {
        let principal = &ctx.principal;
        if !self.policy.permits(principal.role, Action::GenerateAct) {
            return Err(ActError::PermissionDenied);
        }
        let (Some(start), Some(end)) = (input.period_start, input.period_end) else {
            return Err(ActError::invalid("period dates are required"));
        };
        if start > end {
            return Err(ActError::invalid(
                "period_start must be before or equal to period_end",
            ));
        }
        let period_start = TimeStamp::from(start).day();
        let period_end = TimeStamp::from(end).day();

        ctx.ensure_active()?;
        let contract = self
            .ledger
            .get_contract(&input.contract_id)?
            .ok_or(ActError::NotFound)?;

        if principal.is(Role::Contractor) && contract.contractor_id() != Some(principal.org_id) {
            return Err(ActError::PermissionDenied);
        }
        if period_start < contract.start_at {
            return Err(ActError::invalid(format!(
                "period_start ({}) is before contract start date ({})",
                period_start, contract.start_at
            )));
        }
        if period_end > contract.end_at {
            return Err(ActError::invalid(format!(
                "period_end ({}) is after contract end date ({})",
                period_end, contract.end_at
            )));
        }

        let window = TripWindow::for_days(period_start, period_end)
            .ok_or_else(|| ActError::invalid("period_end is out of range"))?;
        let trips = self.select_trips(ctx, &contract, &window)?;

        let total_volume = round(trips.iter().map(|t| t.volume_m3).sum(), 3);
        if total_volume <= 0.0 {
            return Err(ActError::NoBillableTrips);
        }

        let vat_rate = self.config.vat_rate;
        let amounts = ActAmounts::compute(total_volume, contract.price_per_m3, vat_rate);

        ctx.ensure_active()?;
        let paid_before = self.ledger.sum_acts(&contract.id)?;
        let budget_exceeded =
            contract.budget_total > 0.0 && paid_before + amounts.amount_wo_vat > contract.budget_total;

        let now = self.clock.now();
        let act_date = TimeStamp::from(now).day();
        let act_number = build_act_number(&self.config.number_prefix, &contract.id, &act_date);
        let status = if contract.requires_approval() {
            ActStatus::PendingApproval
        } else {
            ActStatus::Generated
        };

        let new_act = NewAct {
            contract_id: contract.id,
            contractor_id: contract.contractor_id(),
            landfill_id: contract.landfill_id(),
            act_number,
            act_date,
            period_start,
            period_end,
            total_volume_m3: total_volume,
            price_per_m3: contract.price_per_m3,
            amount_wo_vat: amounts.amount_wo_vat,
            vat_rate,
            vat_amount: amounts.vat_amount,
            amount_with_vat: amounts.amount_with_vat,
            status,
            created_by_org_id: principal.org_id,
            created_by_user_id: principal.user_id,
            created_at: TimeStamp::from(now),
        };
        let trip_ids: Vec<Id> = trips.iter().map(|t| t.id).collect();

        ctx.ensure_active()?;
        let act = self.ledger.create_act(new_act, &trip_ids).inspect_err(|e| {
            if matches!(e, LedgerError::ActNumberTaken(_) | LedgerError::TripAlreadyClaimed(_)) {
                warn!(contract = %contract.id, error = %e, "act claim conflict, nothing stored");
            }
        })?;

        info!(
            act = %act.id,
            act_number = %act.act_number,
            contract = %contract.id,
            trips = trip_ids.len(),
            volume_m3 = act.total_volume_m3,
            amount_with_vat = act.amount_with_vat,
            status = %act.status,
            "act generated"
        );
        if budget_exceeded {
            warn!(
                contract = %contract.id,
                budget_total = contract.budget_total,
                billed = paid_before + act.amount_wo_vat,
                "contract budget exceeded"
            );
        }

        let (counterparty, customer) = self.resolve_parties(ctx, &contract)?;
        let doc = ActDocument {
            act,
            contract,
            counterparty,
            customer,
            work_description: self.config.work_description.clone(),
            paid_before,
            budget_exceeded,
        };
        let content = self.renderer.render(&doc).map_err(|e| {
            error!(act_number = %doc.act.act_number, error = %e, "act rendering failed");
            ActError::Render(e)
        })?;

        let file_name = format!(
            "act-{}.{}",
            sanitize_file_name(&doc.act.act_number),
            self.renderer.file_extension()
        );
        Ok(GenerateActResult {
            file_name,
            content,
            act: doc.act,
            budget_exceeded,
        })
    }

    fn select_trips(
        &self,
        ctx: &RequestContext,
        contract: &Contract,
        window: &TripWindow,
    ) -> Result<Vec<TripForAct>, ActError> {
        let statuses = &self.config.valid_statuses;
        match contract.kind {
            ContractKind::LandfillService { .. } => {
                ctx.ensure_active()?;
                let polygon_ids = self.ledger.contract_polygon_ids(&contract.id)?;
                if polygon_ids.is_empty() {
                    return Err(ActError::invalid("contract has no polygons"));
                }
                ctx.ensure_active()?;
                Ok(self.ledger.list_trips_for_landfill_contract(
                    &contract.id,
                    &polygon_ids,
                    window,
                    statuses,
                )?)
            }
            ContractKind::ContractorService { .. } => {
                ctx.ensure_active()?;
                Ok(self
                    .ledger
                    .list_trips_for_period(&contract.id, window, statuses)?)
            }
        }
    }

    fn resolve_parties(
        &self,
        ctx: &RequestContext,
        contract: &Contract,
    ) -> Result<(Organization, Organization), ActError> {
        ctx.ensure_active()?;
        let counterparty_id = contract.counterparty_id();
        let counterparty = self
            .ledger
            .get_organization(&counterparty_id)?
            .unwrap_or_else(|| Organization::placeholder(counterparty_id));
        let customer = self
            .ledger
            .get_organization(&contract.customer_org_id)?
            .unwrap_or_else(|| Organization::placeholder(contract.customer_org_id));
        Ok((counterparty, customer))
    }

    /// Approve an act waiting for the landfill's sign-off
    pub fn approve_act(&self, ctx: &RequestContext, act_id: &Id) -> Result<Act, ActError> {
        self.approve(ctx, act_id)
            .inspect_err(|e| log_unclassified("act approval", act_id, e))
    }

    fn approve(&self, ctx: &RequestContext, act_id: &Id) -> Result<Act, ActError> {
        let principal = &ctx.principal;
        if !self.policy.permits(principal.role, Action::ApproveAct) {
            return Err(ActError::PermissionDenied);
        }
        self.load_pending_for(ctx, act_id, principal)?;

        let update = StatusUpdate {
            status: ActStatus::Approved,
            rejection_reason: None,
            approved_by_org_id: Some(principal.org_id),
            approved_by_user_id: Some(principal.user_id),
            approved_at: Some(TimeStamp::from(self.clock.now())),
        };
        let act = self.transition(ctx, act_id, update)?;

        info!(act = %act.id, act_number = %act.act_number, approver = %principal.org_id, "act approved");
        Ok(act)
    }

    /// Reject an act waiting for the landfill's sign-off. The reason is stored trimmed.
    pub fn reject_act(
        &self,
        ctx: &RequestContext,
        act_id: &Id,
        reason: &str,
    ) -> Result<Act, ActError> {
        self.reject(ctx, act_id, reason)
            .inspect_err(|e| log_unclassified("act rejection", act_id, e))
    }

    fn reject(&self, ctx: &RequestContext, act_id: &Id, reason: &str) -> Result<Act, ActError> {
        let principal = &ctx.principal;
        if !self.policy.permits(principal.role, Action::ApproveAct) {
            return Err(ActError::PermissionDenied);
        }
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(ActError::invalid("rejection reason is required"));
        }
        self.load_pending_for(ctx, act_id, principal)?;

        let update = StatusUpdate {
            status: ActStatus::Rejected,
            rejection_reason: Some(reason.to_string()),
            approved_by_org_id: None,
            approved_by_user_id: None,
            approved_at: None,
        };
        let act = self.transition(ctx, act_id, update)?;

        info!(act = %act.id, act_number = %act.act_number, reason, "act rejected");
        Ok(act)
    }

    fn load_pending_for(
        &self,
        ctx: &RequestContext,
        act_id: &Id,
        principal: &Principal,
    ) -> Result<Act, ActError> {
        ctx.ensure_active()?;
        let act = self.ledger.get_act(act_id)?.ok_or(ActError::NotFound)?;

        if act.landfill_id != Some(principal.org_id) {
            return Err(ActError::PermissionDenied);
        }
        if act.status != ActStatus::PendingApproval {
            return Err(ActError::invalid(NOT_PENDING));
        }
        Ok(act)
    }

    /// Stores the decision. A concurrent decision landing first turns this one into invalid input.
    fn transition(
        &self,
        ctx: &RequestContext,
        act_id: &Id,
        update: StatusUpdate,
    ) -> Result<Act, ActError> {
        ctx.ensure_active()?;
        match self
            .ledger
            .update_act_status(act_id, ActStatus::PendingApproval, update)
        {
            Ok(act) => Ok(act),
            Err(LedgerError::StatusConflict { .. }) => {
                warn!(act = %act_id, "act decided concurrently");
                Err(ActError::invalid(NOT_PENDING))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Fetch a single act, visible to its own contractor or landfill and to akimat/kgu.
    pub fn get_act(&self, ctx: &RequestContext, act_id: &Id) -> Result<Act, ActError> {
        self.fetch(ctx, act_id)
            .inspect_err(|e| log_unclassified("act lookup", act_id, e))
    }

    fn fetch(&self, ctx: &RequestContext, act_id: &Id) -> Result<Act, ActError> {
        let principal = &ctx.principal;
        if !self.policy.permits(principal.role, Action::ViewAct) {
            return Err(ActError::PermissionDenied);
        }
        ctx.ensure_active()?;
        let act = self.ledger.get_act(act_id)?.ok_or(ActError::NotFound)?;

        let owner = match principal.role {
            Role::Landfill => act.landfill_id,
            Role::Contractor => act.contractor_id,
            Role::Akimat | Role::Kgu => return Ok(act),
            Role::Driver => return Err(ActError::PermissionDenied),
        };
        if owner != Some(principal.org_id) {
            return Err(ActError::PermissionDenied);
        }
        Ok(act)
    }

    /// Acts issued under the caller's landfill contracts.
    pub fn list_acts_for_landfill(
        &self,
        ctx: &RequestContext,
        status: Option<ActStatus>,
    ) -> Result<Vec<Act>, ActError> {
        let principal = &ctx.principal;
        if !self.policy.permits(principal.role, Action::ListLandfillActs) {
            return Err(ActError::PermissionDenied);
        }
        ctx.ensure_active()
            .and_then(|()| self.ledger.list_acts_for_landfill(&principal.org_id, status))
            .map_err(|e| {
                error!(operation = "landfill act listing", landfill = %principal.org_id, error = %e, "act operation failed");
                ActError::from(e)
            })
    }
}

const NOT_PENDING: &str = "act is not pending approval";

/// Storage and cancellation failures reach callers as a generic error, so they are logged here.
fn log_unclassified(operation: &'static str, subject: &Id, err: &ActError) {
    if let ActError::Ledger(e) = err {
        error!(operation, subject = %subject, error = %e, "act operation failed");
    }
}
