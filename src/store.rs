//! sled-backed ledger.
//!
//! Every record is CBOR encoded and keyed by its 16 byte id. The claim relation (`act_trip`)
//! is keyed by trip id alone, so a trip can point at no more than one act. `create_act`
//! writes the act, its number index and all claims in one multi-tree transaction.
use super::error::LedgerError;
use super::ledger::{ActLedger, Directory, ReportLedger, TripWindow};
use super::model::{
    Act, ActStatus, Contract, ContractKind, NewAct, Organization, Polygon, StatusUpdate,
    TripForAct, TripRecord,
};
use super::report::{ReportMode, TripDetail, TripGroup};
use super::types::Id;
use sled::Transactional;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::debug;

const CONTRACTOR_KIND: &str = "CONTRACTOR";

#[derive(Clone)]
pub struct SledLedger {
    organizations: sled::Tree,
    polygons: sled::Tree,
    contracts: sled::Tree,
    contract_polygons: sled::Tree,
    trips: sled::Tree,
    acts: sled::Tree,
    act_numbers: sled::Tree,
    act_trip: sled::Tree,
}

fn encode<T: minicbor::Encode<()>>(value: &T) -> Result<Vec<u8>, LedgerError> {
    minicbor::to_vec(value).map_err(|e| LedgerError::Codec(e.to_string()))
}

fn decode<'b, T: minicbor::Decode<'b, ()>>(bytes: &'b [u8]) -> Result<T, LedgerError> {
    minicbor::decode(bytes).map_err(|e| LedgerError::Codec(e.to_string()))
}

fn is_test_name(name: &str) -> bool {
    name.trim_start()
        .get(..4)
        .is_some_and(|head| head.eq_ignore_ascii_case("TEST"))
}

impl SledLedger {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let db = sled::open(path)?;
        Self::from_db(&db)
    }

    pub fn from_db(db: &sled::Db) -> Result<Self, LedgerError> {
        Ok(Self {
            organizations: db.open_tree("organizations")?,
            polygons: db.open_tree("polygons")?,
            contracts: db.open_tree("contracts")?,
            contract_polygons: db.open_tree("contract_polygons")?,
            trips: db.open_tree("trips")?,
            acts: db.open_tree("acts")?,
            act_numbers: db.open_tree("act_numbers")?,
            act_trip: db.open_tree("act_trip")?,
        })
    }

    pub fn put_organization(&self, org: &Organization) -> Result<(), LedgerError> {
        self.organizations.insert(org.id.as_bytes(), encode(org)?)?;
        Ok(())
    }

    pub fn put_polygon(&self, polygon: &Polygon) -> Result<(), LedgerError> {
        self.polygons.insert(polygon.id.as_bytes(), encode(polygon)?)?;
        Ok(())
    }

    pub fn put_contract(&self, contract: &Contract) -> Result<(), LedgerError> {
        self.contracts.insert(contract.id.as_bytes(), encode(contract)?)?;
        Ok(())
    }

    pub fn link_contract_polygon(&self, contract_id: &Id, polygon_id: &Id) -> Result<(), LedgerError> {
        let mut key = contract_id.as_bytes().to_vec();
        key.extend_from_slice(polygon_id.as_bytes());
        self.contract_polygons.insert(key, polygon_id.as_bytes())?;
        Ok(())
    }

    pub fn put_trip(&self, trip: &TripRecord) -> Result<(), LedgerError> {
        self.trips.insert(trip.id.as_bytes(), encode(trip)?)?;
        Ok(())
    }

    /// Act currently holding the claim on `trip_id`, if any.
    pub fn claim_of(&self, trip_id: &Id) -> Result<Option<Id>, LedgerError> {
        self.act_trip
            .get(trip_id.as_bytes())?
            .map(|raw| decode::<Id>(&raw))
            .transpose()
    }

    fn scan<T>(&self, tree: &sled::Tree) -> Result<Vec<T>, LedgerError>
    where
        T: for<'b> minicbor::Decode<'b, ()>,
    {
        tree.iter()
            .values()
            .map(|raw| decode::<T>(&raw?))
            .collect()
    }

    fn all_trips(&self) -> Result<Vec<TripRecord>, LedgerError> {
        self.scan(&self.trips)
    }

    fn all_acts(&self) -> Result<Vec<Act>, LedgerError> {
        self.scan(&self.acts)
    }

    fn is_claimed(&self, trip_id: &Id) -> Result<bool, LedgerError> {
        Ok(self.act_trip.contains_key(trip_id.as_bytes())?)
    }

    fn status_allowed(trip: &TripRecord, statuses: &[String]) -> bool {
        statuses.is_empty() || statuses.iter().any(|s| s.eq_ignore_ascii_case(&trip.status))
    }

    /// Unclaimed trips in the window, filtered and ordered by entry time.
    fn billable_trips<F>(
        &self,
        kind: &ContractKind,
        window: &TripWindow,
        statuses: &[String],
        select: F,
    ) -> Result<Vec<TripForAct>, LedgerError>
    where
        F: Fn(&TripRecord) -> bool,
    {
        let mut trips = Vec::new();
        for trip in self.all_trips()? {
            if !select(&trip)
                || !window.contains(trip.entry_at.to_datetime_utc())
                || !Self::status_allowed(&trip, statuses)
                || self.is_claimed(&trip.id)?
            {
                continue;
            }
            trips.push(TripForAct {
                id: trip.id,
                volume_m3: trip.volume_for(kind),
                entry_at: trip.entry_at,
            });
        }
        trips.sort_by(|a, b| a.entry_at.cmp(&b.entry_at).then(a.id.cmp(&b.id)));
        Ok(trips)
    }

    /// Trips matching the report target in the window, paired with their counterpart id.
    fn report_trips(
        &self,
        mode: ReportMode,
        target: &Id,
        window: &TripWindow,
        statuses: &[String],
    ) -> Result<Vec<(Option<Id>, TripRecord)>, LedgerError> {
        let mut rows = Vec::new();
        for trip in self.all_trips()? {
            if !window.contains(trip.entry_at.to_datetime_utc())
                || !Self::status_allowed(&trip, statuses)
            {
                continue;
            }
            let (own, counterpart) = match mode {
                ReportMode::Contractor => (trip.contractor_id, trip.polygon_id),
                ReportMode::Landfill => (trip.polygon_id, trip.contractor_id),
            };
            if own != Some(*target) {
                continue;
            }
            rows.push((counterpart, trip));
        }
        Ok(rows)
    }

    /// Display name for a counterpart; `None` when a landfill report should skip it.
    fn counterpart_name(&self, mode: ReportMode, id: &Id) -> Result<Option<String>, LedgerError> {
        match mode {
            ReportMode::Contractor => Ok(Some(
                self.get_polygon(id)?.map(|p| p.name).unwrap_or_default(),
            )),
            ReportMode::Landfill => Ok(self
                .get_organization(id)?
                .filter(|org| org.kind == CONTRACTOR_KIND && !is_test_name(&org.name))
                .map(|org| org.name)),
        }
    }

    fn detail_for(&self, trip: TripRecord) -> Result<TripDetail, LedgerError> {
        let polygon_name = match &trip.polygon_id {
            Some(id) => self.get_polygon(id)?.map(|p| p.name),
            None => None,
        };
        let contractor_name = match &trip.contractor_id {
            Some(id) => self.get_organization(id)?.map(|o| o.name),
            None => None,
        };
        let total_volume_m3 = trip.detected_volume_entry.map(|entry| {
            entry - trip.detected_volume_exit.unwrap_or(0.0)
        });

        Ok(TripDetail {
            id: trip.id,
            entry_at: trip.entry_at,
            exit_at: trip.exit_at,
            status: trip.status,
            polygon_id: trip.polygon_id,
            polygon_name,
            contractor_id: trip.contractor_id,
            contractor_name,
            vehicle_plate_number: trip.vehicle_plate,
            detected_plate_number: trip.detected_plate,
            detected_volume_entry: trip.detected_volume_entry,
            detected_volume_exit: trip.detected_volume_exit,
            total_volume_m3,
        })
    }
}

impl Directory for SledLedger {
    fn get_organization(&self, id: &Id) -> Result<Option<Organization>, LedgerError> {
        self.organizations
            .get(id.as_bytes())?
            .map(|raw| decode(&raw))
            .transpose()
    }

    fn get_polygon(&self, id: &Id) -> Result<Option<Polygon>, LedgerError> {
        self.polygons
            .get(id.as_bytes())?
            .map(|raw| decode(&raw))
            .transpose()
    }
}

impl ActLedger for SledLedger {
    fn get_contract(&self, id: &Id) -> Result<Option<Contract>, LedgerError> {
        self.contracts
            .get(id.as_bytes())?
            .map(|raw| decode(&raw))
            .transpose()
    }

    fn contract_polygon_ids(&self, contract_id: &Id) -> Result<Vec<Id>, LedgerError> {
        let mut ids = self
            .contract_polygons
            .scan_prefix(contract_id.as_bytes())
            .keys()
            .map(|key| {
                let key = key?;
                let bytes: [u8; 16] = key
                    .get(16..)
                    .unwrap_or_default()
                    .try_into()
                    .map_err(|_| LedgerError::Codec("malformed contract polygon key".into()))?;
                Ok(Id::from_bytes(bytes))
            })
            .collect::<Result<Vec<_>, LedgerError>>()?;
        ids.sort();
        Ok(ids)
    }

    fn list_trips_for_period(
        &self,
        contract_id: &Id,
        window: &TripWindow,
        statuses: &[String],
    ) -> Result<Vec<TripForAct>, LedgerError> {
        let kind = match self.get_contract(contract_id)? {
            Some(contract) => contract.kind,
            None => return Ok(vec![]),
        };
        self.billable_trips(&kind, window, statuses, |trip| {
            trip.contract_id == Some(*contract_id)
        })
    }

    fn list_trips_for_landfill_contract(
        &self,
        contract_id: &Id,
        polygon_ids: &[Id],
        window: &TripWindow,
        statuses: &[String],
    ) -> Result<Vec<TripForAct>, LedgerError> {
        if polygon_ids.is_empty() {
            return Ok(vec![]);
        }
        let kind = match self.get_contract(contract_id)? {
            Some(contract) => contract.kind,
            None => return Ok(vec![]),
        };
        self.billable_trips(&kind, window, statuses, |trip| {
            trip.polygon_id.is_some_and(|p| polygon_ids.contains(&p))
        })
    }

    fn sum_acts(&self, contract_id: &Id) -> Result<f64, LedgerError> {
        Ok(self
            .all_acts()?
            .iter()
            .filter(|act| act.contract_id == *contract_id)
            .map(|act| act.amount_wo_vat)
            .sum())
    }

    fn create_act(&self, act: NewAct, trip_ids: &[Id]) -> Result<Act, LedgerError> {
        let act = act.into_act(Id::new());
        let act_cbor = encode(&act)?;
        let act_id_cbor = encode(&act.id)?;
        let number = act.act_number.as_bytes();

        let outcome = (&self.acts, &self.act_numbers, &self.act_trip).transaction(
            |(acts, numbers, claims)| {
                if numbers.get(number)?.is_some() {
                    return Err(ConflictableTransactionError::Abort(
                        LedgerError::ActNumberTaken(act.act_number.clone()),
                    ));
                }
                for trip_id in trip_ids {
                    if claims.get(trip_id.as_bytes())?.is_some() {
                        return Err(ConflictableTransactionError::Abort(
                            LedgerError::TripAlreadyClaimed(*trip_id),
                        ));
                    }
                    claims.insert(trip_id.as_bytes(), act_id_cbor.as_slice())?;
                }
                numbers.insert(number, act.id.as_bytes())?;
                acts.insert(act.id.as_bytes(), act_cbor.as_slice())?;
                Ok(())
            },
        );

        match outcome {
            Ok(()) => {
                debug!(act = %act.id, claims = trip_ids.len(), "act stored");
                Ok(act)
            }
            Err(TransactionError::Abort(e)) => Err(e),
            Err(TransactionError::Storage(e)) => Err(LedgerError::Storage(e)),
        }
    }

    fn get_act(&self, id: &Id) -> Result<Option<Act>, LedgerError> {
        self.acts
            .get(id.as_bytes())?
            .map(|raw| decode(&raw))
            .transpose()
    }

    fn update_act_status(
        &self,
        id: &Id,
        expected: ActStatus,
        update: StatusUpdate,
    ) -> Result<Act, LedgerError> {
        let outcome = self.acts.transaction(|acts| {
            let raw = acts
                .get(id.as_bytes())?
                .ok_or(ConflictableTransactionError::Abort(LedgerError::MissingAct(*id)))?;
            let mut act: Act = decode(&raw).map_err(ConflictableTransactionError::Abort)?;
            if act.status != expected {
                return Err(ConflictableTransactionError::Abort(
                    LedgerError::StatusConflict { id: *id, expected },
                ));
            }
            act.apply(update.clone());
            let bytes = encode(&act).map_err(ConflictableTransactionError::Abort)?;
            acts.insert(id.as_bytes(), bytes)?;
            Ok(act)
        });

        match outcome {
            Ok(act) => {
                debug!(act = %act.id, status = %act.status, "act status updated");
                Ok(act)
            }
            Err(TransactionError::Abort(e)) => Err(e),
            Err(TransactionError::Storage(e)) => Err(LedgerError::Storage(e)),
        }
    }

    fn list_acts_for_landfill(
        &self,
        landfill_id: &Id,
        status: Option<ActStatus>,
    ) -> Result<Vec<Act>, LedgerError> {
        let mut acts: Vec<Act> = self
            .all_acts()?
            .into_iter()
            .filter(|act| act.landfill_id == Some(*landfill_id))
            .filter(|act| status.is_none_or(|s| act.status == s))
            .collect();
        acts.sort_by(|a, b| {
            a.act_date
                .cmp(&b.act_date)
                .then_with(|| a.act_number.cmp(&b.act_number))
        });
        Ok(acts)
    }
}

impl ReportLedger for SledLedger {
    fn list_polygons(&self) -> Result<Vec<TripGroup>, LedgerError> {
        let mut polygons: Vec<Polygon> = self.scan(&self.polygons)?;
        polygons.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(polygons
            .into_iter()
            .map(|p| TripGroup::new(Some(p.id), p.name, 0))
            .collect())
    }

    fn list_contractors(&self) -> Result<Vec<TripGroup>, LedgerError> {
        let mut orgs: Vec<Organization> = self
            .scan::<Organization>(&self.organizations)?
            .into_iter()
            .filter(|org| org.kind == CONTRACTOR_KIND && !is_test_name(&org.name))
            .collect();
        orgs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(orgs
            .into_iter()
            .map(|org| TripGroup::new(Some(org.id), org.name, 0))
            .collect())
    }

    fn event_counts(
        &self,
        mode: ReportMode,
        target: &Id,
        window: &TripWindow,
        statuses: &[String],
    ) -> Result<Vec<TripGroup>, LedgerError> {
        let mut counts: HashMap<Option<Id>, i64> = HashMap::new();
        for (counterpart, _) in self.report_trips(mode, target, window, statuses)? {
            *counts.entry(counterpart).or_insert(0) += 1;
        }

        // ordered by name, then id, so the output is stable
        let mut named: BTreeMap<(String, Option<Id>), i64> = BTreeMap::new();
        for (counterpart, count) in counts {
            let name = match &counterpart {
                Some(id) => match self.counterpart_name(mode, id)? {
                    Some(name) => name,
                    None => continue,
                },
                // contractor-less trips never reach a landfill report
                None if mode == ReportMode::Landfill => continue,
                None => String::new(),
            };
            named.insert((name, counterpart), count);
        }

        Ok(named
            .into_iter()
            .map(|((name, id), count)| TripGroup::new(id, name, count))
            .collect())
    }

    fn event_details(
        &self,
        mode: ReportMode,
        target: &Id,
        counterpart: &Id,
        window: &TripWindow,
        statuses: &[String],
    ) -> Result<Vec<TripDetail>, LedgerError> {
        let mut trips: Vec<TripRecord> = self
            .report_trips(mode, target, window, statuses)?
            .into_iter()
            .filter(|(other, _)| *other == Some(*counterpart))
            .map(|(_, trip)| trip)
            .collect();
        trips.sort_by(|a, b| a.entry_at.cmp(&b.entry_at).then(a.id.cmp(&b.id)));

        trips.into_iter().map(|trip| self.detail_for(trip)).collect()
    }
}
