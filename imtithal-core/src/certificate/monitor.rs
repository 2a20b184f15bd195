//! Background certificate lifecycle monitor.
//!
//! Sweeps every scope that holds a selectable certificate, demotes
//! expired ones, and kicks off renewal for certificates entering the
//! renewal window. Renewal here runs without an OTP; environments that
//! require one must renew through the operator path instead.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{info, warn};

use crate::certificate::{CertificateError, CertificateStatus, CertificateStore};
use crate::config::EngineConfig;
use crate::notify::{Notifier, Severity};
use crate::store::StoreError;

const SWEEP_PERIOD: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub renewed: usize,
    pub expired: usize,
    pub renewal_failures: usize,
}

pub struct LifecycleMonitor {
    store: CertificateStore,
    notifier: Arc<dyn Notifier>,
    config: EngineConfig,
}

impl LifecycleMonitor {
    pub fn new(
        store: CertificateStore,
        notifier: Arc<dyn Notifier>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            notifier,
            config,
        }
    }

    /// One pass over all scopes with a selectable certificate.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, StoreError> {
        let mut report = SweepReport::default();
        let renewal_threshold = now + to_chrono(self.config.renewal_window());

        for scope in self.store.repository().selectable_scopes().await? {
            let Some(certificate) = self.store.repository().selectable(scope).await? else {
                continue;
            };

            if certificate.expires_at() <= now {
                self.store
                    .repository()
                    .set_status(certificate.id(), CertificateStatus::Expired)
                    .await?;
                self.notifier
                    .notify(
                        Severity::Critical,
                        "certificate expired; signing for this scope is blocked",
                        json!({
                            "scope": scope.to_string(),
                            "certificate": certificate.id().to_string(),
                            "expired_at": certificate.expires_at().to_rfc3339(),
                        }),
                    )
                    .await;
                report.expired += 1;
                continue;
            }

            if certificate.expires_at() > renewal_threshold {
                continue;
            }

            if certificate.status() == CertificateStatus::Active {
                self.store
                    .repository()
                    .set_status(certificate.id(), CertificateStatus::Expiring)
                    .await?;
                self.notifier
                    .notify(
                        Severity::Warning,
                        "certificate entered renewal window",
                        json!({
                            "scope": scope.to_string(),
                            "certificate": certificate.id().to_string(),
                            "expires_at": certificate.expires_at().to_rfc3339(),
                        }),
                    )
                    .await;
            }

            match self.store.renew(scope, None).await {
                Ok(renewed) => {
                    info!(scope = %scope, certificate = %renewed.id(), "automatic renewal succeeded");
                    report.renewed += 1;
                }
                Err(CertificateError::Store(e)) => return Err(e),
                Err(e) => {
                    // The expiring certificate stays selectable; the next
                    // sweep tries again.
                    warn!(scope = %scope, error = %e, "automatic renewal failed");
                    self.notifier
                        .notify(
                            Severity::Warning,
                            "automatic certificate renewal failed",
                            json!({
                                "scope": scope.to_string(),
                                "certificate": certificate.id().to_string(),
                                "error": e.to_string(),
                            }),
                        )
                        .await;
                    report.renewal_failures += 1;
                }
            }
        }
        Ok(report)
    }

    /// Runs sweeps on a fixed period until the task is dropped.
    pub async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(SWEEP_PERIOD);
        loop {
            ticker.tick().await;
            if let Err(e) = self.sweep(Utc::now()).await {
                warn!(error = %e, "lifecycle sweep failed");
            }
        }
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}
