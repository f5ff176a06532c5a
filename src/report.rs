use std::fmt::Write;

use chrono::NaiveDate;

use crate::models::{CategoryCount, GrowthKpi, HeatmapCell, PeriodCount, RateKpi};
use crate::service::{Metric, MetricValue};

const WEEKDAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

pub fn build_report(as_of: NaiveDate, results: &[(Metric, MetricValue)]) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Clinical Appointments KPI Snapshot");
    let _ = writeln!(output, "Generated as of {}", as_of);

    for (metric, value) in results {
        let _ = writeln!(output);
        let _ = writeln!(output, "## {}", metric);

        match value {
            MetricValue::Categories(rows) => write_categories(&mut output, rows),
            MetricValue::Periods(rows) => write_periods(&mut output, rows),
            MetricValue::Heatmap(cells) => write_heatmap(&mut output, cells),
            MetricValue::Rate(kpi) => write_rate(&mut output, kpi),
            MetricValue::Growth(kpi) => write_growth(&mut output, kpi.as_ref()),
        }
    }

    output
}

fn write_categories(output: &mut String, rows: &[CategoryCount]) {
    if rows.is_empty() {
        let _ = writeln!(output, "No appointments recorded.");
        return;
    }

    for row in rows {
        let _ = writeln!(output, "- {}: {}", row.especialidad, row.total);
    }
}

fn write_periods(output: &mut String, rows: &[PeriodCount]) {
    if rows.is_empty() {
        let _ = writeln!(output, "No appointments recorded.");
        return;
    }

    for row in rows {
        let _ = writeln!(output, "- {}: {}", row.period, row.total);
    }
}

fn write_heatmap(output: &mut String, cells: &[HeatmapCell]) {
    if cells.is_empty() {
        let _ = writeln!(output, "No appointments recorded.");
        return;
    }

    for cell in cells {
        let day = usize::try_from(cell.dow)
            .ok()
            .and_then(|dow| WEEKDAYS.get(dow))
            .copied()
            .unwrap_or("?");
        let _ = writeln!(output, "- {} {:02}:00: {}", day, cell.hour, cell.total);
    }
}

fn write_rate(output: &mut String, kpi: &RateKpi) {
    let _ = writeln!(output, "{:.2}% ({} of {})", kpi.percent, kpi.numerator, kpi.denominator);
}

fn write_growth(output: &mut String, kpi: Option<&GrowthKpi>) {
    match kpi {
        Some(kpi) => {
            let _ = writeln!(
                output,
                "{} vs {}: {} vs {} ({:+.2}%)",
                kpi.current_month,
                kpi.previous_month,
                kpi.current_total,
                kpi.previous_total,
                kpi.growth_percent
            );
        }
        None => {
            let _ = writeln!(output, "Not enough history (needs two months of appointments).");
        }
    }
}
