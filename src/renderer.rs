//! Document renderers. Byte formats live outside the engines; the engines only see these traits.
use super::model::ActDocument;
use super::report::{ActReport, ReportMode};
use csv::WriterBuilder;
use std::fmt::Write;

pub trait ActRenderer {
    fn render(&self, doc: &ActDocument) -> anyhow::Result<Vec<u8>>;
    fn file_extension(&self) -> &'static str;
}

pub trait ReportRenderer {
    fn render(&self, report: &ActReport) -> anyhow::Result<Vec<u8>>;
    fn file_extension(&self) -> &'static str;
}

/// Text certificate and a CSV report. Good enough for previews and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextRenderer;

impl ActRenderer for PlainTextRenderer {
    fn render(&self, doc: &ActDocument) -> anyhow::Result<Vec<u8>> {
        let act = &doc.act;
        let mut out = String::new();

        writeln!(out, "ACT OF COMPLETED WORK No {}", act.act_number)?;
        writeln!(out, "Date: {}", act.act_date)?;
        writeln!(out, "Contract: {} ({})", doc.contract.name, doc.contract.id)?;
        writeln!(out, "Customer: {} BIN {}", doc.customer.name, doc.customer.bin)?;
        writeln!(out, "Contractor: {} BIN {}", doc.counterparty.name, doc.counterparty.bin)?;
        writeln!(out, "Period: {} - {}", act.period_start, act.period_end)?;
        writeln!(out, "Work: {}", doc.work_description)?;
        writeln!(out, "Volume, m3: {:.3}", act.total_volume_m3)?;
        writeln!(out, "Price per m3: {:.2}", act.price_per_m3)?;
        writeln!(out, "Amount excl. VAT: {:.2}", act.amount_wo_vat)?;
        writeln!(out, "VAT {:.2}%: {:.2}", act.vat_rate, act.vat_amount)?;
        writeln!(out, "Amount incl. VAT: {:.2}", act.amount_with_vat)?;
        writeln!(out, "Paid before: {:.2}", doc.paid_before)?;
        if doc.budget_exceeded {
            writeln!(
                out,
                "WARNING: contract budget {:.2} exceeded",
                doc.contract.budget_total
            )?;
        }
        writeln!(out, "Status: {}", act.status)?;

        Ok(out.into_bytes())
    }

    fn file_extension(&self) -> &'static str {
        "txt"
    }
}

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

impl ReportRenderer for PlainTextRenderer {
    fn render(&self, report: &ActReport) -> anyhow::Result<Vec<u8>> {
        let group_label = match report.mode {
            ReportMode::Contractor => "Polygon",
            ReportMode::Landfill => "Contractor",
        };
        // summary, group table and detail sections have different widths
        let mut wtr = WriterBuilder::new().flexible(true).from_writer(vec![]);

        wtr.write_record(["Report Type", report.mode.as_str()])?;
        wtr.write_record(["Target", report.target.name.as_str()])?;
        wtr.write_record(["Target ID".to_string(), report.target.id.to_string()])?;
        wtr.write_record(["Period Start".to_string(), report.period_start.to_string()])?;
        wtr.write_record(["Period End".to_string(), report.period_end.to_string()])?;
        wtr.write_record(["Total Trips".to_string(), report.total_trips.to_string()])?;

        wtr.write_record(["ID", group_label, "Trip Count", "Volume M3"])?;
        for group in &report.groups {
            wtr.write_record([
                group.id.map(|id| id.to_string()).unwrap_or_default(),
                group.name.clone(),
                group.trip_count.to_string(),
                format!("{:.2}", group.total_volume()),
            ])?;
        }

        for group in report.groups.iter().filter(|g| !g.trips.is_empty()) {
            wtr.write_record([group_label, group.name.as_str()])?;
            wtr.write_record(["Entry", "Exit", "Status", "Plate", "Polygon", "Contractor", "Volume M3"])?;
            for trip in &group.trips {
                wtr.write_record([
                    trip.entry_at.to_datetime_utc().format(TIME_FORMAT).to_string(),
                    trip.exit_at
                        .map(|t| t.to_datetime_utc().format(TIME_FORMAT).to_string())
                        .unwrap_or_default(),
                    trip.status.clone(),
                    trip.plate().unwrap_or_default().to_string(),
                    trip.polygon_name.clone().unwrap_or_default(),
                    trip.contractor_name.clone().unwrap_or_default(),
                    format!("{:.2}", trip.total_volume_m3.unwrap_or(0.0)),
                ])?;
            }
        }

        wtr.flush()?;
        Ok(wtr.into_inner().map_err(|e| e.into_error())?)
    }

    fn file_extension(&self) -> &'static str {
        "csv"
    }
}
