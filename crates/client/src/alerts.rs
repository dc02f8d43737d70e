//! Alert endpoints.

use bytes::Bytes;
use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use watchtower_core::{ListOptions, PaginationMeta};

use crate::{Error, Request, WatchtowerClient, encode_segment};

/// An alert raised against a monitored server or probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    /// Alert identifier.
    pub id: String,
    /// Short summary.
    pub title: String,
    /// `info`, `warning` or `critical`.
    pub severity: String,
    /// `open`, `acknowledged` or `resolved`.
    pub status: String,
    /// Server the alert belongs to, if any.
    #[serde(default)]
    pub server_uuid: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    /// RFC 3339 creation time.
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Payload for creating an alert.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CreateAlert {
    pub title: String,
    pub severity: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_uuid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// One page of alerts.
#[derive(Debug, Clone)]
pub struct AlertPage {
    pub alerts: Vec<Alert>,
    /// Paging information, when the server reported it.
    pub meta: Option<PaginationMeta>,
}

impl WatchtowerClient {
    /// List alerts, filtered and paged by `options`.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # async fn example() -> Result<(), watchtower_client::Error> {
    /// use watchtower_client::{ListOptions, WatchtowerClient};
    ///
    /// let client = WatchtowerClient::builder("https://api.watchtower.example")
    ///     .token("tok")
    ///     .build()?;
    /// let page = client
    ///     .list_alerts(&ListOptions::new().page(1).limit(25).severity("critical"))
    ///     .await?;
    /// for alert in &page.alerts {
    ///     println!("{}: {}", alert.id, alert.title);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn list_alerts(&self, options: &ListOptions) -> Result<AlertPage, Error> {
        let response = self
            .execute::<Vec<Alert>>(Request::get("/v1/alerts").list_options(options))
            .await?;
        Ok(AlertPage {
            meta: response.meta,
            alerts: response.data.unwrap_or_default(),
        })
    }

    /// Get one alert. Returns `None` if it does not exist.
    pub async fn get_alert(&self, id: &str) -> Result<Option<Alert>, Error> {
        let path = format!("/v1/alerts/{}", encode_segment(id));
        match self.execute::<Alert>(Request::get(path)).await {
            Ok(response) => Ok(response.data),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Create an alert and return it as stored by the server.
    pub async fn create_alert(&self, alert: &CreateAlert) -> Result<Alert, Error> {
        let request = Request::post("/v1/alerts").json(alert)?;
        self.execute::<Alert>(request).await?.require_data()
    }

    /// Mark an alert as acknowledged.
    pub async fn acknowledge_alert(&self, id: &str) -> Result<Alert, Error> {
        let path = format!("/v1/alerts/{}/acknowledge", encode_segment(id));
        self.execute::<Alert>(Request::post(path)).await?.require_data()
    }

    /// Delete an alert.
    pub async fn delete_alert(&self, id: &str) -> Result<(), Error> {
        let path = format!("/v1/alerts/{}", encode_segment(id));
        self.execute::<IgnoredAny>(Request::delete(path)).await?;
        Ok(())
    }

    /// Export matching alerts as CSV.
    pub async fn export_alerts_csv(&self, options: &ListOptions) -> Result<Bytes, Error> {
        let request = Request::get("/v1/alerts/export")
            .list_options(options)
            .query("format", "csv");
        Ok(self.execute_raw(request).await?.body)
    }
}
