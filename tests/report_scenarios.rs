//! Report aggregation against a sled ledger
use chrono::{DateTime, TimeZone, Utc};
use snow_acts::{
    context::RequestContext,
    error::ActError,
    model::{Organization, Polygon, TripRecord},
    principal::{AccessPolicy, Principal, Role},
    renderer::PlainTextRenderer,
    report::{ReportMode, ReportRequest, ReportService, TripGroup},
    store::SledLedger,
    types::{Id, TimeStamp},
};
use tempfile::{TempDir, tempdir};

struct Fixture {
    _dir: TempDir,
    ledger: SledLedger,
    snow_co: Id,
    another_co: Id,
    test_co: Id,
    north: Id,
    south: Id,
    west: Id,
}

fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
}

fn org(id: Id, name: &str, kind: &str) -> Organization {
    Organization {
        name: name.into(),
        kind: kind.into(),
        ..Organization::placeholder(id)
    }
}

fn trip(
    polygon: Option<Id>,
    contractor: Option<Id>,
    entry_at: DateTime<Utc>,
    status: &str,
    volume: f64,
) -> TripRecord {
    TripRecord {
        id: Id::new(),
        contract_id: None,
        polygon_id: polygon,
        contractor_id: contractor,
        status: status.into(),
        entry_at: TimeStamp::from(entry_at),
        exit_at: Some(TimeStamp::from(entry_at + chrono::Duration::minutes(20))),
        vehicle_plate: Some("777AAA02".into()),
        detected_plate: None,
        detected_volume_entry: Some(volume),
        detected_volume_exit: None,
    }
}

fn setup() -> anyhow::Result<Fixture> {
    let dir = tempdir()?;
    let ledger = SledLedger::open(dir.path().join("reports.db"))?;

    let snow_co = Id::new();
    let another_co = Id::new();
    let test_co = Id::new();
    ledger.put_organization(&org(snow_co, "Snow Co", "CONTRACTOR"))?;
    ledger.put_organization(&org(another_co, "Another Co", "CONTRACTOR"))?;
    ledger.put_organization(&org(test_co, "TEST Co", "CONTRACTOR"))?;
    ledger.put_organization(&org(Id::new(), "City Akimat", "AKIMAT"))?;

    let north = Id::new();
    let south = Id::new();
    let west = Id::new();
    for (id, name) in [(north, "North"), (south, "South"), (west, "West")] {
        ledger.put_polygon(&Polygon { id, name: name.into(), owner_org_id: None })?;
    }

    ledger.put_trip(&trip(Some(north), Some(snow_co), at(2025, 1, 10, 9), "OK", 1.0))?;
    ledger.put_trip(&trip(Some(north), Some(snow_co), at(2025, 1, 11, 9), "OK", 2.0))?;
    ledger.put_trip(&trip(Some(north), Some(snow_co), at(2025, 1, 12, 9), "ok", 3.0))?;
    ledger.put_trip(&trip(Some(south), Some(snow_co), at(2025, 1, 14, 9), "OK", 4.0))?;
    ledger.put_trip(&trip(Some(south), Some(snow_co), at(2025, 1, 13, 9), "OK", 3.0))?;
    // filtered by status
    ledger.put_trip(&trip(Some(south), Some(snow_co), at(2025, 1, 15, 9), "CANCELLED", 9.0))?;
    // outside the period
    ledger.put_trip(&trip(Some(south), Some(snow_co), at(2025, 2, 15, 9), "OK", 9.0))?;
    // no polygon recorded
    ledger.put_trip(&trip(None, Some(snow_co), at(2025, 1, 16, 9), "OK", 5.0))?;
    // test organizations never reach a landfill report
    ledger.put_trip(&trip(Some(south), Some(test_co), at(2025, 1, 17, 9), "OK", 6.0))?;

    Ok(Fixture { _dir: dir, ledger, snow_co, another_co, test_co, north, south, west })
}

fn service(fx: &Fixture) -> ReportService<SledLedger, PlainTextRenderer> {
    ReportService::new(
        fx.ledger.clone(),
        PlainTextRenderer,
        AccessPolicy::default(),
        vec!["OK".to_string()],
    )
}

fn ctx(org_id: Id, role: Role) -> RequestContext {
    RequestContext::new(Principal::new(org_id, Id::new(), role))
}

fn january(mode: ReportMode, target: Id) -> ReportRequest {
    ReportRequest {
        mode,
        target_id: Some(target),
        period_start: Some(at(2025, 1, 1, 0)),
        period_end: Some(at(2025, 1, 31, 0)),
    }
}

#[test]
fn contractor_report_lists_every_polygon() -> anyhow::Result<()> {
    let fx = setup()?;
    let akimat = ctx(Id::new(), Role::Akimat);

    let result = service(&fx).generate_report(&akimat, january(ReportMode::Contractor, fx.snow_co))?;
    let report = &result.report;

    assert_eq!(report.target.name, "Snow Co");
    assert_eq!(report.total_trips, 6);

    let summary: Vec<(Option<Id>, &str, i64)> = report
        .groups
        .iter()
        .map(|g| (g.id, g.name.as_str(), g.trip_count))
        .collect();
    assert_eq!(
        summary,
        vec![
            (Some(fx.north), "North", 3),
            (Some(fx.south), "South", 2),
            (Some(fx.west), "West", 0),
            (None, "", 1),
        ]
    );

    let south = &report.groups[1];
    let volumes: Vec<Option<f64>> = south.trips.iter().map(|t| t.total_volume_m3).collect();
    // ordered by entry time, not insertion
    assert_eq!(volumes, vec![Some(3.0), Some(4.0)]);
    assert_eq!(south.total_volume(), 7.0);
    assert_eq!(south.trips[0].polygon_name.as_deref(), Some("South"));
    assert_eq!(south.trips[0].contractor_name.as_deref(), Some("Snow Co"));
    assert_eq!(south.trips[0].plate(), Some("777AAA02"));

    // a group with no counterpart id gets no detail rows
    assert!(report.groups[3].trips.is_empty());
    assert!(report.groups[2].trips.is_empty());

    assert_eq!(
        result.file_name,
        "act-report-contractor-Snow-Co-20250101-20250131.csv"
    );
    let csv = String::from_utf8(result.content)?;
    assert!(csv.contains("Report Type,CONTRACTOR"));
    assert!(csv.contains("Total Trips,6"));
    assert!(csv.contains(&format!("{},West,0,0.00", fx.west)));

    Ok(())
}

#[test]
fn landfill_report_skips_test_organizations() -> anyhow::Result<()> {
    let fx = setup()?;
    let landfill = ctx(Id::new(), Role::Landfill);

    let report = service(&fx).build_report(&landfill, january(ReportMode::Landfill, fx.south))?;

    assert_eq!(report.target.name, "South");
    assert_eq!(report.target.kind, "POLYGON");
    assert_eq!(
        report.groups.iter().map(|g| (g.id, g.trip_count)).collect::<Vec<_>>(),
        vec![(Some(fx.another_co), 0), (Some(fx.snow_co), 2)]
    );
    assert!(report.groups.iter().all(|g| g.id != Some(fx.test_co)));
    assert_eq!(report.total_trips, 2);
    assert_eq!(report.groups[1].total_volume(), 7.0);

    Ok(())
}

#[test]
fn idle_polygon_still_lists_all_contractors() -> anyhow::Result<()> {
    let fx = setup()?;
    let kgu = ctx(Id::new(), Role::Kgu);

    let report = service(&fx).build_report(&kgu, january(ReportMode::Landfill, fx.west))?;

    assert_eq!(report.total_trips, 0);
    assert_eq!(
        report.groups,
        vec![
            TripGroup::new(Some(fx.another_co), "Another Co", 0),
            TripGroup::new(Some(fx.snow_co), "Snow Co", 0),
        ]
    );

    Ok(())
}

#[test]
fn report_requests_are_validated() -> anyhow::Result<()> {
    let fx = setup()?;
    let service = service(&fx);
    let akimat = ctx(Id::new(), Role::Akimat);

    let no_target = ReportRequest {
        target_id: None,
        ..january(ReportMode::Contractor, fx.snow_co)
    };
    assert!(matches!(
        service.build_report(&akimat, no_target),
        Err(ActError::InvalidInput(_))
    ));

    let no_dates = ReportRequest {
        period_start: None,
        ..january(ReportMode::Contractor, fx.snow_co)
    };
    assert!(matches!(
        service.build_report(&akimat, no_dates),
        Err(ActError::InvalidInput(_))
    ));

    let reversed = ReportRequest {
        period_start: Some(at(2025, 2, 1, 0)),
        period_end: Some(at(2025, 1, 1, 0)),
        ..january(ReportMode::Contractor, fx.snow_co)
    };
    assert!(matches!(
        service.build_report(&akimat, reversed),
        Err(ActError::InvalidInput(_))
    ));

    assert!(matches!(
        service.build_report(&akimat, january(ReportMode::Contractor, Id::new())),
        Err(ActError::NotFound)
    ));
    assert!(matches!(
        service.build_report(&akimat, january(ReportMode::Landfill, fx.snow_co)),
        Err(ActError::NotFound)
    ));

    Ok(())
}

#[test]
fn report_permissions_follow_the_mode() -> anyhow::Result<()> {
    let fx = setup()?;
    let service = service(&fx);

    let own = ctx(fx.snow_co, Role::Contractor);
    service.build_report(&own, january(ReportMode::Contractor, fx.snow_co))?;

    let other = ctx(fx.another_co, Role::Contractor);
    assert!(matches!(
        service.build_report(&other, january(ReportMode::Contractor, fx.snow_co)),
        Err(ActError::PermissionDenied)
    ));
    assert!(matches!(
        service.build_report(&own, january(ReportMode::Landfill, fx.north)),
        Err(ActError::PermissionDenied)
    ));
    assert!(matches!(
        service.build_report(&ctx(Id::new(), Role::Landfill), january(ReportMode::Contractor, fx.snow_co)),
        Err(ActError::PermissionDenied)
    ));
    assert!(matches!(
        service.build_report(&ctx(fx.snow_co, Role::Driver), january(ReportMode::Contractor, fx.snow_co)),
        Err(ActError::PermissionDenied)
    ));

    Ok(())
}

#[test]
fn cancelled_report_stops_before_querying() -> anyhow::Result<()> {
    let fx = setup()?;
    let akimat = ctx(Id::new(), Role::Akimat);
    akimat.cancel_handle().cancel();

    let err = service(&fx)
        .build_report(&akimat, january(ReportMode::Landfill, fx.north))
        .unwrap_err();
    assert_eq!(err.public_message(), "internal error");

    Ok(())
}
