//! Query Service: one read-only aggregation per metric.
//!
//! Every operation checks a single connection out of the pool, runs one
//! statement and maps the rows into the output records. Operations share no
//! state, so any subset can run concurrently. "Today" is bound as a query
//! parameter rather than read from the database clock.

use std::fmt;
use std::future::Future;
use std::str::FromStr;

use chrono::{Local, NaiveDate};
use serde::Serialize;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use crate::error::QueryError;
use crate::metrics::{self, Granularity};
use crate::models::{CategoryCount, GrowthKpi, HeatmapCell, PeriodCount, RateKpi};

#[derive(Clone)]
pub struct QueryService {
    pool: PgPool,
    today: Option<NaiveDate>,
}

impl QueryService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool, today: None }
    }

    /// Pins the reference date used by the date-relative KPIs.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Local::now().date_naive())
    }

    pub async fn appointments_by_specialty(&self) -> Result<Vec<CategoryCount>, QueryError> {
        observe(Metric::AppointmentsBySpecialty, async {
            let rows = sqlx::query(
                r#"
                SELECT e.nombre AS especialidad, COUNT(*) AS total
                FROM cita c
                JOIN especialidad e ON e.id = c.especialidad_id
                GROUP BY e.nombre
                ORDER BY total DESC, e.nombre
                "#,
            )
            .fetch_all(&self.pool)
            .await?;

            rows.iter()
                .map(|row| {
                    Ok(CategoryCount {
                        especialidad: row.try_get("especialidad")?,
                        total: row.try_get("total")?,
                    })
                })
                .collect::<Result<Vec<_>, sqlx::Error>>()
        })
        .await
    }

    /// Buckets are labelled with their start date (`YYYY-MM-DD`) for both
    /// granularities.
    pub async fn appointments_series(
        &self,
        granularity: Granularity,
    ) -> Result<Vec<PeriodCount>, QueryError> {
        observe(Metric::AppointmentsSeries(granularity), async {
            let rows = sqlx::query(
                r#"
                SELECT to_char(date_trunc($1, h.fecha::timestamp), 'YYYY-MM-DD') AS period,
                       COUNT(*) AS total
                FROM cita c
                JOIN horarios h ON h.id = c.horario_id
                GROUP BY 1
                ORDER BY 1
                "#,
            )
            .bind(granularity.trunc_unit())
            .fetch_all(&self.pool)
            .await?;

            rows.iter()
                .map(period_count)
                .collect::<Result<Vec<_>, sqlx::Error>>()
        })
        .await
    }

    pub async fn appointments_by_month(&self) -> Result<Vec<PeriodCount>, QueryError> {
        observe(Metric::AppointmentsByMonth, async {
            let rows = sqlx::query(
                r#"
                SELECT to_char(date_trunc('month', h.fecha::timestamp), 'YYYY-MM') AS period,
                       COUNT(*) AS total
                FROM cita c
                JOIN horarios h ON h.id = c.horario_id
                GROUP BY 1
                ORDER BY 1
                "#,
            )
            .fetch_all(&self.pool)
            .await?;

            rows.iter()
                .map(period_count)
                .collect::<Result<Vec<_>, sqlx::Error>>()
        })
        .await
    }

    pub async fn appointments_by_day(&self) -> Result<Vec<PeriodCount>, QueryError> {
        observe(Metric::AppointmentsByDay, async {
            let rows = sqlx::query(
                r#"
                SELECT to_char(h.fecha, 'YYYY-MM-DD') AS period, COUNT(*) AS total
                FROM cita c
                JOIN horarios h ON h.id = c.horario_id
                GROUP BY 1
                ORDER BY 1
                "#,
            )
            .fetch_all(&self.pool)
            .await?;

            rows.iter()
                .map(period_count)
                .collect::<Result<Vec<_>, sqlx::Error>>()
        })
        .await
    }

    /// An appointment counts as attended once its slot date is in the past;
    /// there is no explicit attendance flag upstream.
    pub async fn attendance_rate(&self) -> Result<RateKpi, QueryError> {
        let today = self.today();
        observe(Metric::AttendanceRate, async {
            let row = sqlx::query(
                r#"
                SELECT COUNT(*) AS total,
                       COUNT(*) FILTER (WHERE h.fecha < $1) AS attended
                FROM cita c
                JOIN horarios h ON h.id = c.horario_id
                "#,
            )
            .bind(today)
            .fetch_one(&self.pool)
            .await?;

            let total: i64 = row.try_get("total")?;
            let attended: i64 = row.try_get("attended")?;
            Ok::<_, sqlx::Error>(metrics::rate_kpi(attended, total))
        })
        .await
    }

    pub async fn schedule_heatmap(&self) -> Result<Vec<HeatmapCell>, QueryError> {
        observe(Metric::ScheduleHeatmap, async {
            let rows = sqlx::query(
                r#"
                SELECT EXTRACT(DOW FROM h.fecha)::int AS dow,
                       EXTRACT(HOUR FROM h.time_slot)::int AS hour,
                       COUNT(*) AS total
                FROM cita c
                JOIN horarios h ON h.id = c.horario_id
                GROUP BY 1, 2
                ORDER BY 1, 2
                "#,
            )
            .fetch_all(&self.pool)
            .await?;

            rows.iter()
                .map(|row| {
                    Ok(HeatmapCell {
                        dow: row.try_get("dow")?,
                        hour: row.try_get("hour")?,
                        total: row.try_get("total")?,
                    })
                })
                .collect::<Result<Vec<_>, sqlx::Error>>()
        })
        .await
    }

    /// `None` until at least two distinct months hold appointments.
    pub async fn appointment_growth(&self) -> Result<Option<GrowthKpi>, QueryError> {
        observe(Metric::AppointmentGrowth, async {
            let row = sqlx::query(
                r#"
                WITH monthly AS (
                    SELECT date_trunc('month', h.fecha::timestamp) AS m, COUNT(*) AS total
                    FROM cita c
                    JOIN horarios h ON h.id = c.horario_id
                    GROUP BY 1
                ), ranked AS (
                    SELECT m, total, ROW_NUMBER() OVER (ORDER BY m DESC) AS rn
                    FROM monthly
                )
                SELECT to_char(curr.m, 'YYYY-MM') AS current_month,
                       to_char(prev.m, 'YYYY-MM') AS previous_month,
                       curr.total AS current_total,
                       prev.total AS previous_total
                FROM ranked curr
                JOIN ranked prev ON prev.rn = curr.rn + 1
                WHERE curr.rn = 1
                "#,
            )
            .fetch_optional(&self.pool)
            .await?;

            let Some(row) = row else {
                return Ok(None);
            };

            Ok::<_, sqlx::Error>(Some(metrics::growth_kpi(
                row.try_get("current_month")?,
                row.try_get("previous_month")?,
                row.try_get("current_total")?,
                row.try_get("previous_total")?,
            )))
        })
        .await
    }

    /// New users per month, keyed by the month of each user's first appointment.
    pub async fn user_growth(&self) -> Result<Vec<PeriodCount>, QueryError> {
        observe(Metric::UserGrowth, async {
            let rows = sqlx::query(
                r#"
                WITH first_use AS (
                    SELECT c.usuario_id AS uid, MIN(h.fecha) AS first_date
                    FROM cita c
                    JOIN horarios h ON h.id = c.horario_id
                    GROUP BY c.usuario_id
                )
                SELECT to_char(date_trunc('month', first_date::timestamp), 'YYYY-MM') AS period,
                       COUNT(*) AS total
                FROM first_use
                GROUP BY 1
                ORDER BY 1
                "#,
            )
            .fetch_all(&self.pool)
            .await?;

            rows.iter()
                .map(period_count)
                .collect::<Result<Vec<_>, sqlx::Error>>()
        })
        .await
    }

    pub async fn schedule_occupancy_rate(&self) -> Result<RateKpi, QueryError> {
        let (start, end) = metrics::occupancy_window(self.today());
        observe(Metric::ScheduleOccupancyRate, async {
            let row = sqlx::query(
                r#"
                SELECT COUNT(DISTINCT h.id) AS total,
                       COUNT(DISTINCT c.horario_id) AS occupied
                FROM horarios h
                LEFT JOIN cita c ON c.horario_id = h.id
                WHERE h.fecha >= $1 AND h.fecha <= $2
                "#,
            )
            .bind(start)
            .bind(end)
            .fetch_one(&self.pool)
            .await?;

            let total: i64 = row.try_get("total")?;
            let occupied: i64 = row.try_get("occupied")?;
            Ok::<_, sqlx::Error>(metrics::rate_kpi(occupied, total))
        })
        .await
    }

    /// A past slot that is still flagged available is taken to be one that was
    /// booked and then cancelled.
    pub async fn cancellation_rate(&self) -> Result<RateKpi, QueryError> {
        let (start, end) = metrics::cancellation_window(self.today());
        observe(Metric::CancellationRate, async {
            let row = sqlx::query(
                r#"
                SELECT COUNT(*) AS total,
                       COUNT(*) FILTER (WHERE h.disponibilidad = true) AS cancelled
                FROM horarios h
                WHERE h.fecha >= $1 AND h.fecha < $2
                "#,
            )
            .bind(start)
            .bind(end)
            .fetch_one(&self.pool)
            .await?;

            let total: i64 = row.try_get("total")?;
            let cancelled: i64 = row.try_get("cancelled")?;
            Ok::<_, sqlx::Error>(metrics::rate_kpi(cancelled, total))
        })
        .await
    }

    pub async fn evaluate(&self, metric: Metric) -> Result<MetricValue, QueryError> {
        let value = match metric {
            Metric::AppointmentsBySpecialty => {
                MetricValue::Categories(self.appointments_by_specialty().await?)
            }
            Metric::AppointmentsSeries(granularity) => {
                MetricValue::Periods(self.appointments_series(granularity).await?)
            }
            Metric::AppointmentsByMonth => {
                MetricValue::Periods(self.appointments_by_month().await?)
            }
            Metric::AppointmentsByDay => MetricValue::Periods(self.appointments_by_day().await?),
            Metric::AttendanceRate => MetricValue::Rate(self.attendance_rate().await?),
            Metric::ScheduleHeatmap => MetricValue::Heatmap(self.schedule_heatmap().await?),
            Metric::AppointmentGrowth => MetricValue::Growth(self.appointment_growth().await?),
            Metric::UserGrowth => MetricValue::Periods(self.user_growth().await?),
            Metric::ScheduleOccupancyRate => {
                MetricValue::Rate(self.schedule_occupancy_rate().await?)
            }
            Metric::CancellationRate => MetricValue::Rate(self.cancellation_rate().await?),
        };
        Ok(value)
    }
}

fn period_count(row: &PgRow) -> Result<PeriodCount, sqlx::Error> {
    Ok(PeriodCount {
        period: row.try_get("period")?,
        total: row.try_get("total")?,
    })
}

async fn observe<T, F>(metric: Metric, query: F) -> Result<T, QueryError>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    query.await.map_err(|err| {
        tracing::error!(metric = %metric, error = %err, "metric query failed");
        QueryError::Unavailable(err)
    })
}

/// The metrics the service can produce, keyed by their API field name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    AppointmentsBySpecialty,
    AppointmentsSeries(Granularity),
    AppointmentsByMonth,
    AppointmentsByDay,
    AttendanceRate,
    ScheduleHeatmap,
    AppointmentGrowth,
    UserGrowth,
    ScheduleOccupancyRate,
    CancellationRate,
}

impl Metric {
    pub const ALL: [Metric; 10] = [
        Metric::AppointmentsBySpecialty,
        Metric::AppointmentsSeries(Granularity::Month),
        Metric::AppointmentsByMonth,
        Metric::AppointmentsByDay,
        Metric::AttendanceRate,
        Metric::ScheduleHeatmap,
        Metric::AppointmentGrowth,
        Metric::UserGrowth,
        Metric::ScheduleOccupancyRate,
        Metric::CancellationRate,
    ];

    pub fn field_name(self) -> &'static str {
        match self {
            Metric::AppointmentsBySpecialty => "citasPorEspecialidad",
            Metric::AppointmentsSeries(_) => "citasSerie",
            Metric::AppointmentsByMonth => "citasPorMes",
            Metric::AppointmentsByDay => "citasPorDia",
            Metric::AttendanceRate => "kpiAsistencia",
            Metric::ScheduleHeatmap => "heatmapHorarios",
            Metric::AppointmentGrowth => "kpiCrecimientoCitas",
            Metric::UserGrowth => "usuariosCrecimiento",
            Metric::ScheduleOccupancyRate => "kpiOcupacionHorarios",
            Metric::CancellationRate => "kpiTasaCancelacion",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::AppointmentsSeries(granularity) => {
                write!(f, "citasSerie:{}", granularity.trunc_unit())
            }
            other => f.write_str(other.field_name()),
        }
    }
}

/// Accepts a field name; `citasSerie` may carry a granularity suffix
/// (`citasSerie:week`), normalized the same way as the API argument.
impl FromStr for Metric {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (name, argument) = match value.split_once(':') {
            Some((name, argument)) => (name, Some(argument)),
            None => (value, None),
        };

        if name == "citasSerie" {
            let granularity = argument.map(Granularity::lenient).unwrap_or_default();
            return Ok(Metric::AppointmentsSeries(granularity));
        }

        Metric::ALL
            .into_iter()
            .find(|metric| argument.is_none() && metric.field_name() == name)
            .ok_or_else(|| format!("unknown metric: {value}"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetricValue {
    Categories(Vec<CategoryCount>),
    Periods(Vec<PeriodCount>),
    Heatmap(Vec<HeatmapCell>),
    Rate(RateKpi),
    Growth(Option<GrowthKpi>),
}
