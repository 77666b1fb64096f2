//! Transaction controls for [`DataLink`].
//!
//! Every control leaves the connection back in auto-commit mode once the
//! transaction ends, whether the end succeeded or not.

use futures::future::BoxFuture;
use tracing::debug;

use crate::core::identifier::validate_identifier;
use crate::error::Result;

use super::DataLink;

impl DataLink {
    /// Leave auto-commit mode.
    pub async fn begin(&mut self) -> Result<()> {
        let result = match self.connection().await {
            Ok(conn) => conn.begin().await,
            Err(e) => Err(e),
        };
        result.map_err(|e| e.on_source(&self.name))
    }

    /// Commit and return to auto-commit mode.
    ///
    /// If the commit fails and the backend still reports an open
    /// transaction, it is rolled back before the error is returned.
    pub async fn commit(&mut self) -> Result<()> {
        let name = self.name.clone();
        let result = match self.connection().await {
            Ok(conn) => {
                let committed = conn.commit().await;
                if committed.is_err() && conn.in_transaction() {
                    if let Err(e) = conn.rollback().await {
                        debug!("{}: rollback after failed commit also failed: {}", name, e);
                    }
                }
                committed
            }
            Err(e) => Err(e),
        };
        result.map_err(|e| e.on_source(&name))
    }

    /// Roll back and return to auto-commit mode.
    pub async fn rollback(&mut self) -> Result<()> {
        let result = match self.connection().await {
            Ok(conn) => conn.rollback().await,
            Err(e) => Err(e),
        };
        result.map_err(|e| e.on_source(&self.name))
    }

    /// Whether a transaction is open. False when not connected.
    pub fn in_transaction(&self) -> bool {
        self.conn.as_ref().is_some_and(|c| c.in_transaction())
    }

    /// Create a savepoint inside the open transaction.
    pub async fn savepoint(&mut self, name: &str) -> Result<()> {
        validate_identifier(name)?;
        let result = match self.connection().await {
            Ok(conn) => conn.savepoint(name).await,
            Err(e) => Err(e),
        };
        result.map_err(|e| e.on_source(&self.name))
    }

    /// Roll back to a savepoint; the transaction stays open.
    pub async fn rollback_to(&mut self, name: &str) -> Result<()> {
        validate_identifier(name)?;
        let result = match self.connection().await {
            Ok(conn) => conn.rollback_to(name).await,
            Err(e) => Err(e),
        };
        result.map_err(|e| e.on_source(&self.name))
    }

    /// Release a savepoint.
    pub async fn release_savepoint(&mut self, name: &str) -> Result<()> {
        validate_identifier(name)?;
        let result = match self.connection().await {
            Ok(conn) => conn.release_savepoint(name).await,
            Err(e) => Err(e),
        };
        result.map_err(|e| e.on_source(&self.name))
    }

    /// Run `f` inside a transaction.
    ///
    /// Commits when `f` succeeds and rolls back when it fails; a rollback
    /// failure is logged and the original error returned.
    ///
    /// ```rust,ignore
    /// let id = link
    ///     .transaction(|link| Box::pin(async move {
    ///         link.write("INSERT INTO audit (msg) VALUES ($1)", &["start".into()], false).await?;
    ///         Ok(7)
    ///     }))
    ///     .await?;
    /// ```
    pub async fn transaction<T, F>(&mut self, f: F) -> Result<T>
    where
        T: Send,
        F: for<'c> FnOnce(&'c mut DataLink) -> BoxFuture<'c, Result<T>>,
    {
        self.begin().await?;
        match f(self).await {
            Ok(value) => {
                self.commit().await?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = self.rollback().await {
                    debug!("{}: rollback failed: {}", self.name, rollback_err);
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::core::traits::Capabilities;
    use crate::error::DbError;
    use crate::link::DataLink;
    use crate::testing::MockBackend;

    #[tokio::test]
    async fn test_transaction_commits_on_success() {
        let backend = MockBackend::new(Capabilities::default());
        let mut link = DataLink::new("warehouse", backend.driver());

        let value = link
            .transaction(|link| {
                Box::pin(async move {
                    link.write("INSERT INTO t VALUES (1)", &[], false).await?;
                    Ok(5)
                })
            })
            .await
            .unwrap();

        assert_eq!(value, 5);
        assert!(!link.in_transaction());
        assert_eq!(backend.log().transaction_events, vec!["begin", "commit"]);
    }

    #[tokio::test]
    async fn test_transaction_rolls_back_on_error() {
        let backend = MockBackend::new(Capabilities::default());
        let mut link = DataLink::new("warehouse", backend.driver());

        let result: crate::error::Result<()> = link
            .transaction(|_link| {
                Box::pin(async move { Err(DbError::Driver("constraint violated".into())) })
            })
            .await;

        assert!(result.is_err());
        assert!(!link.in_transaction());
        assert_eq!(backend.log().transaction_events, vec!["begin", "rollback"]);
    }

    #[tokio::test]
    async fn test_failed_commit_restores_auto_commit() {
        let mut backend = MockBackend::new(Capabilities::default());
        backend.fail_commit = true;
        let mut link = DataLink::new("warehouse", backend.driver());

        link.begin().await.unwrap();
        assert!(link.in_transaction());
        let err = link.commit().await.unwrap_err();
        assert!(matches!(err, DbError::Query { ref data_source, .. } if data_source == "warehouse"));
        assert!(!link.in_transaction());
    }

    #[tokio::test]
    async fn test_savepoint_name_is_validated() {
        let backend = MockBackend::new(Capabilities::default());
        let mut link = DataLink::new("warehouse", backend.driver());
        assert!(link.savepoint("").await.is_err());
        link.savepoint("before_import").await.unwrap();
        assert_eq!(
            backend.log().transaction_events,
            vec!["savepoint before_import"]
        );
    }
}
