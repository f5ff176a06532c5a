//! GraphQL surface over [`QueryService`].
//!
//! Top-level fields are nullable and never fail outright: a failing metric
//! resolves to an explicit `null` with its own entry in `errors`, and sibling
//! fields in the same document still resolve.

use async_graphql::{
    Context, EmptyMutation, EmptySubscription, ErrorExtensions, Object, PathSegment, Schema,
};

use crate::error::QueryError;
use crate::metrics::Granularity;
use crate::models::{CategoryCount, GrowthKpi, HeatmapCell, PeriodCount, RateKpi};
use crate::service::QueryService;

pub type AnalyticsSchema = Schema<QueryRoot, EmptyMutation, EmptySubscription>;

pub fn build_schema(service: QueryService) -> AnalyticsSchema {
    Schema::build(QueryRoot::new(service), EmptyMutation, EmptySubscription).finish()
}

// Each rate KPI keeps the generic numerator/denominator pair alongside the
// field names existing dashboards already query.
macro_rules! rate_kpi_object {
    ($ty:ident, $gql_name:tt, $numerator_alias:ident) => {
        pub struct $ty(pub RateKpi);

        #[Object(name = $gql_name)]
        impl $ty {
            async fn percent(&self) -> f64 {
                self.0.percent
            }

            async fn numerator(&self) -> i64 {
                self.0.numerator
            }

            async fn denominator(&self) -> i64 {
                self.0.denominator
            }

            async fn $numerator_alias(&self) -> i64 {
                self.0.numerator
            }

            async fn total(&self) -> i64 {
                self.0.denominator
            }
        }
    };
}

rate_kpi_object!(AttendanceKpi, "KpiAsistencia", attended);
rate_kpi_object!(OccupancyKpi, "KpiOcupacion", ocupados);
rate_kpi_object!(CancellationKpi, "KpiCancelacion", canceladas);

pub struct QueryRoot {
    service: QueryService,
}

impl QueryRoot {
    pub fn new(service: QueryService) -> Self {
        Self { service }
    }
}

/// Records a failed metric against its field and resolves the field to
/// `null`. Returning the error instead would drop the key from `data`.
fn settle<T>(ctx: &Context<'_>, result: Result<T, QueryError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            let mut error = err.extend().into_server_error(ctx.item.pos);
            error.path = vec![PathSegment::Field(ctx.item.node.response_key().node.to_string())];
            ctx.add_error(error);
            None
        }
    }
}

#[Object]
impl QueryRoot {
    async fn citas_por_especialidad(&self, ctx: &Context<'_>) -> Option<Vec<CategoryCount>> {
        settle(ctx, self.service.appointments_by_specialty().await)
    }

    async fn citas_serie(
        &self,
        ctx: &Context<'_>,
        #[graphql(default = "month")] granularidad: String,
    ) -> Option<Vec<PeriodCount>> {
        let granularity = Granularity::lenient(&granularidad);
        settle(ctx, self.service.appointments_series(granularity).await)
    }

    async fn citas_por_mes(&self, ctx: &Context<'_>) -> Option<Vec<PeriodCount>> {
        settle(ctx, self.service.appointments_by_month().await)
    }

    async fn citas_por_dia(&self, ctx: &Context<'_>) -> Option<Vec<PeriodCount>> {
        settle(ctx, self.service.appointments_by_day().await)
    }

    async fn kpi_asistencia(&self, ctx: &Context<'_>) -> Option<AttendanceKpi> {
        settle(ctx, self.service.attendance_rate().await).map(AttendanceKpi)
    }

    async fn heatmap_horarios(&self, ctx: &Context<'_>) -> Option<Vec<HeatmapCell>> {
        settle(ctx, self.service.schedule_heatmap().await)
    }

    /// Null until two distinct months of appointments exist.
    async fn kpi_crecimiento_citas(&self, ctx: &Context<'_>) -> Option<GrowthKpi> {
        settle(ctx, self.service.appointment_growth().await).flatten()
    }

    async fn usuarios_crecimiento(&self, ctx: &Context<'_>) -> Option<Vec<PeriodCount>> {
        settle(ctx, self.service.user_growth().await)
    }

    async fn kpi_ocupacion_horarios(&self, ctx: &Context<'_>) -> Option<OccupancyKpi> {
        settle(ctx, self.service.schedule_occupancy_rate().await).map(OccupancyKpi)
    }

    async fn kpi_tasa_cancelacion(&self, ctx: &Context<'_>) -> Option<CancellationKpi> {
        settle(ctx, self.service.cancellation_rate().await).map(CancellationKpi)
    }
}
