use async_graphql::ErrorExtensions;
use thiserror::Error;

/// Failure of a metric query. The display text is what clients see, so it
/// never carries SQL, hosts or credentials.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("analytics database unavailable")]
    Unavailable(#[source] sqlx::Error),
}

impl QueryError {
    pub fn code(&self) -> &'static str {
        match self {
            QueryError::Unavailable(_) => "SERVICE_UNAVAILABLE",
        }
    }
}

impl ErrorExtensions for QueryError {
    fn extend(&self) -> async_graphql::Error {
        async_graphql::Error::new(self.to_string())
            .extend_with(|_, ext| ext.set("code", self.code()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_hides_driver_details() {
        let err = QueryError::Unavailable(sqlx::Error::Protocol(
            "password authentication failed for user postgres".into(),
        ));
        assert_eq!(err.to_string(), "analytics database unavailable");

        let gql = err.extend();
        assert_eq!(gql.message, "analytics database unavailable");
        assert!(!gql.message.contains("postgres"));
    }
}
