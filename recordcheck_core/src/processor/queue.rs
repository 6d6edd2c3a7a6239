//! Operator views and actions on the client queue.

use crate::models::{ClientId, ClientRecord, ConsultationStatus};
use crate::store::traits::OperationalDb;
use crate::{Error, Result};
use serde::Serialize;

/// Client counts per consultation status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub pending: u64,
    pub processing: u64,
    pub processed: u64,
    pub error: u64,
    pub total: u64,
}

#[tracing::instrument(level = "debug", skip_all)]
pub async fn queue_stats(db: &dyn OperationalDb) -> Result<QueueStats> {
    let counts = db.count_clients_by_status().await?;
    let get = |s: ConsultationStatus| counts.get(&s).copied().unwrap_or(0);
    Ok(QueueStats {
        pending: get(ConsultationStatus::Pending),
        processing: get(ConsultationStatus::Processing),
        processed: get(ConsultationStatus::Processed),
        error: get(ConsultationStatus::Error),
        total: counts.values().sum(),
    })
}

/// Put a finished client (`Error` or `Processed`) back in the queue.
///
/// A `Pending` client is returned unchanged. A `Processing` client belongs to
/// the running worker and is refused.
#[tracing::instrument(level = "info", skip(db))]
pub async fn requeue_client(db: &dyn OperationalDb, id: ClientId) -> Result<ClientRecord> {
    let client = db
        .get_client(id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("client {id}")))?;
    match client.consultation_status {
        ConsultationStatus::Pending => return Ok(client),
        ConsultationStatus::Processing => {
            return Err(Error::InvalidInput(format!(
                "client {id} is being processed"
            )));
        }
        ConsultationStatus::Processed | ConsultationStatus::Error => {}
    }

    db.set_consultation_status(id, ConsultationStatus::Pending)
        .await?;
    tracing::info!(client_id = %id, from = %client.consultation_status, "client requeued");
    db.get_client(id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("client {id}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewClient;
    use crate::store::memory::MemoryOperationalDb;
    use crate::test_support::source_record;

    async fn seeded() -> (MemoryOperationalDb, Vec<ClientId>) {
        let db = MemoryOperationalDb::new();
        let mut ids = Vec::new();
        for ext in 1..=4 {
            ids.push(
                db.insert_client(&NewClient::from(source_record(ext, "PEREZ", "JUAN")))
                    .await
                    .unwrap(),
            );
        }
        db.set_consultation_status(ids[1], ConsultationStatus::Processing)
            .await
            .unwrap();
        db.set_consultation_status(ids[2], ConsultationStatus::Error)
            .await
            .unwrap();
        db.set_consultation_status(ids[3], ConsultationStatus::Processed)
            .await
            .unwrap();
        (db, ids)
    }

    #[tokio::test]
    async fn stats_cover_every_status() {
        let (db, _) = seeded().await;
        assert_eq!(
            queue_stats(&db).await.unwrap(),
            QueueStats {
                pending: 1,
                processing: 1,
                processed: 1,
                error: 1,
                total: 4,
            }
        );
        assert_eq!(
            queue_stats(&MemoryOperationalDb::new()).await.unwrap(),
            QueueStats::default()
        );
    }

    #[tokio::test]
    async fn error_client_goes_back_to_pending() {
        let (db, ids) = seeded().await;
        let client = requeue_client(&db, ids[2]).await.unwrap();
        assert_eq!(client.consultation_status, ConsultationStatus::Pending);

        let processed = requeue_client(&db, ids[3]).await.unwrap();
        assert_eq!(processed.consultation_status, ConsultationStatus::Pending);
    }

    #[tokio::test]
    async fn in_flight_and_unknown_clients_are_refused() {
        let (db, ids) = seeded().await;
        assert!(matches!(
            requeue_client(&db, ids[1]).await,
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            requeue_client(&db, ClientId(99)).await,
            Err(Error::NotFound(_))
        ));

        let pending = requeue_client(&db, ids[0]).await.unwrap();
        assert_eq!(pending.consultation_status, ConsultationStatus::Pending);
    }
}
