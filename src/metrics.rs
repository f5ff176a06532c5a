use chrono::{Duration, NaiveDate};

use crate::models::{GrowthKpi, RateKpi};

pub const OCCUPANCY_WINDOW_DAYS: i64 = 30;
pub const CANCELLATION_WINDOW_DAYS: i64 = 90;

/// Bucket size for the appointment time series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Granularity {
    Week,
    #[default]
    Month,
}

impl Granularity {
    /// Anything other than "week"/"month" (any case) falls back to month.
    pub fn lenient(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "week" => Granularity::Week,
            _ => Granularity::Month,
        }
    }

    /// Unit name understood by Postgres `date_trunc`.
    pub fn trunc_unit(self) -> &'static str {
        match self {
            Granularity::Week => "week",
            Granularity::Month => "month",
        }
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn rate_kpi(numerator: i64, denominator: i64) -> RateKpi {
    let numerator = numerator.max(0);
    let denominator = denominator.max(0);
    let percent = if denominator == 0 {
        0.0
    } else {
        round2(numerator as f64 / denominator as f64 * 100.0)
    };

    RateKpi {
        percent,
        numerator,
        denominator,
    }
}

pub fn growth_kpi(
    current_month: String,
    previous_month: String,
    current_total: i64,
    previous_total: i64,
) -> GrowthKpi {
    let growth_percent = if previous_total > 0 {
        round2((current_total - previous_total) as f64 / previous_total as f64 * 100.0)
    } else {
        0.0
    };

    GrowthKpi {
        current_month,
        previous_month,
        current_total,
        previous_total,
        growth_percent,
    }
}

/// Slots dated from 30 days ago up to and including `today`.
pub fn occupancy_window(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    (today - Duration::days(OCCUPANCY_WINDOW_DAYS), today)
}

/// Slots dated from 90 days ago up to, but excluding, `today`.
pub fn cancellation_window(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    (today - Duration::days(CANCELLATION_WINDOW_DAYS), today)
}
