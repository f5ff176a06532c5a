use async_graphql::SimpleObject;
use serde::Serialize;

/// Appointment total for one specialty.
#[derive(Debug, Clone, PartialEq, Serialize, SimpleObject)]
#[graphql(name = "BarEspecialidad")]
pub struct CategoryCount {
    pub especialidad: String,
    pub total: i64,
}

/// Count for one time bucket. `period` is `YYYY-MM` or `YYYY-MM-DD`.
#[derive(Debug, Clone, PartialEq, Serialize, SimpleObject)]
#[graphql(name = "SerieCitas")]
pub struct PeriodCount {
    pub period: String,
    pub total: i64,
}

/// Appointments falling on a weekday (0 = Sunday) at a given hour.
#[derive(Debug, Clone, PartialEq, Serialize, SimpleObject)]
#[graphql(name = "HeatmapBin")]
pub struct HeatmapCell {
    pub dow: i32,
    pub hour: i32,
    pub total: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, SimpleObject)]
#[graphql(name = "KpiCrecimiento")]
#[serde(rename_all = "camelCase")]
pub struct GrowthKpi {
    pub current_month: String,
    pub previous_month: String,
    pub current_total: i64,
    pub previous_total: i64,
    pub growth_percent: f64,
}

/// Shared shape of the attendance, occupancy and cancellation KPIs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RateKpi {
    pub percent: f64,
    pub numerator: i64,
    pub denominator: i64,
}
