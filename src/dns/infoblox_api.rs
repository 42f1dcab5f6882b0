// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Infoblox WAPI object access.
//!
//! The [`InfobloxObjectApi`] trait covers the four object operations the
//! provider needs on `zone_delegated` and `record:txt`. Two implementations
//! exist:
//!
//! - [`WapiClient`] - the real HTTP client. Built per call from config,
//!   basic auth, request timeout and pool size from the Infoblox section.
//! - [`FakeInfoblox`] - an in-memory double pinned to
//!   `fakezone.example.com`, selected by `OVERRIDE_FAKE_INFOBLOX` and reused
//!   by the merge tests.

use crate::config::InfobloxConfig;
use crate::constants::FAKE_INFOBLOX_FQDN;
use crate::errors::DnsError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

/// One entry of a delegated zone's `delegate_to` list.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NameServer {
    /// Address of the authoritative server
    pub address: String,
    /// NS name of the authoritative server
    pub name: String,
}

/// A `zone_delegated` object as returned by the WAPI.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ZoneDelegated {
    /// Object reference, required for updates and deletes
    #[serde(rename = "_ref", default)]
    pub ref_: String,
    /// The delegated zone FQDN
    #[serde(default)]
    pub fqdn: String,
    /// The servers the zone is delegated to
    #[serde(default)]
    pub delegate_to: Vec<NameServer>,
}

/// A `record:txt` object as returned by the WAPI.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TxtRecord {
    /// Object reference, required for updates and deletes
    #[serde(rename = "_ref", default)]
    pub ref_: String,
    /// Record name
    #[serde(default)]
    pub name: String,
    /// Record payload
    #[serde(default)]
    pub text: String,
}

/// The object operations the Infoblox provider performs.
#[async_trait]
pub trait InfobloxObjectApi: Send + Sync {
    async fn get_zone_delegated(&self, fqdn: &str) -> Result<Option<ZoneDelegated>, DnsError>;
    async fn create_zone_delegated(
        &self,
        fqdn: &str,
        delegate_to: &[NameServer],
    ) -> Result<(), DnsError>;
    async fn update_zone_delegated(
        &self,
        ref_: &str,
        delegate_to: &[NameServer],
    ) -> Result<(), DnsError>;
    async fn delete_zone_delegated(&self, ref_: &str) -> Result<(), DnsError>;
    async fn get_txt_record(&self, name: &str) -> Result<Option<TxtRecord>, DnsError>;
    async fn create_txt_record(&self, name: &str, text: &str, ttl: u32) -> Result<(), DnsError>;
    async fn update_txt_record(&self, ref_: &str, text: &str) -> Result<(), DnsError>;
    async fn delete_txt_record(&self, ref_: &str) -> Result<(), DnsError>;
}

/// HTTP client for the Infoblox WAPI.
pub struct WapiClient {
    http: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
}

impl WapiClient {
    /// Build a client from the Infoblox configuration section.
    ///
    /// # Errors
    ///
    /// Fails when the underlying HTTP client cannot be constructed.
    pub fn new(config: &InfobloxConfig) -> Result<Self, DnsError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_request_timeout_secs))
            .pool_max_idle_per_host(config.http_pool_connections)
            // Grid managers commonly present certificates signed by a
            // private CA; verification is disabled the same way the
            // transport is configured upstream.
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(Self {
            http,
            base_url: format!(
                "https://{}:{}/wapi/v{}",
                config.host, config.port, config.version
            ),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    async fn request(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<String, DnsError> {
        let url = format!("{}/{path}", self.base_url);
        let mut request = self
            .http
            .request(method, &url)
            .basic_auth(&self.username, Some(&self.password));
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(DnsError::WapiStatus {
                path: path.to_string(),
                status: status.as_u16(),
                body: body.chars().take(256).collect(),
            });
        }
        Ok(body)
    }
}

#[async_trait]
impl InfobloxObjectApi for WapiClient {
    async fn get_zone_delegated(&self, fqdn: &str) -> Result<Option<ZoneDelegated>, DnsError> {
        let path = format!("zone_delegated?fqdn={fqdn}&_return_fields=fqdn,delegate_to");
        let body = self.request(reqwest::Method::GET, &path, None).await?;
        let mut zones: Vec<ZoneDelegated> = serde_json::from_str(&body).unwrap_or_default();
        Ok(if zones.is_empty() {
            None
        } else {
            Some(zones.remove(0))
        })
    }

    async fn create_zone_delegated(
        &self,
        fqdn: &str,
        delegate_to: &[NameServer],
    ) -> Result<(), DnsError> {
        self.request(
            reqwest::Method::POST,
            "zone_delegated",
            Some(json!({ "fqdn": fqdn, "delegate_to": delegate_to })),
        )
        .await?;
        Ok(())
    }

    async fn update_zone_delegated(
        &self,
        ref_: &str,
        delegate_to: &[NameServer],
    ) -> Result<(), DnsError> {
        self.request(
            reqwest::Method::PUT,
            ref_,
            Some(json!({ "delegate_to": delegate_to })),
        )
        .await?;
        Ok(())
    }

    async fn delete_zone_delegated(&self, ref_: &str) -> Result<(), DnsError> {
        self.request(reqwest::Method::DELETE, ref_, None).await?;
        Ok(())
    }

    async fn get_txt_record(&self, name: &str) -> Result<Option<TxtRecord>, DnsError> {
        let path = format!("record:txt?name={name}&_return_fields=name,text");
        let body = self.request(reqwest::Method::GET, &path, None).await?;
        let mut records: Vec<TxtRecord> = serde_json::from_str(&body).unwrap_or_default();
        Ok(if records.is_empty() {
            None
        } else {
            Some(records.remove(0))
        })
    }

    async fn create_txt_record(&self, name: &str, text: &str, ttl: u32) -> Result<(), DnsError> {
        self.request(
            reqwest::Method::POST,
            "record:txt",
            Some(json!({
                "name": name,
                "text": text,
                "view": "default",
                "ttl": ttl,
                "use_ttl": true,
            })),
        )
        .await?;
        Ok(())
    }

    async fn update_txt_record(&self, ref_: &str, text: &str) -> Result<(), DnsError> {
        self.request(reqwest::Method::PUT, ref_, Some(json!({ "text": text })))
            .await?;
        Ok(())
    }

    async fn delete_txt_record(&self, ref_: &str) -> Result<(), DnsError> {
        self.request(reqwest::Method::DELETE, ref_, None).await?;
        Ok(())
    }
}

/// In-memory WAPI double.
///
/// Starts with an empty delegated zone pinned to `fakezone.example.com`,
/// mirroring the connector substituted upstream when the override is on.
#[derive(Default)]
pub struct FakeInfoblox {
    state: Mutex<FakeState>,
}

#[derive(Default)]
struct FakeState {
    zone: Option<ZoneDelegated>,
    txt: HashMap<String, TxtRecord>,
    next_ref: u64,
}

impl FakeInfoblox {
    /// A fake whose delegated zone exists but is empty.
    #[must_use]
    pub fn new() -> Self {
        let fake = Self::default();
        {
            let mut state = fake.state.lock().expect("fake infoblox poisoned");
            state.zone = Some(ZoneDelegated {
                ref_: format!("zone_delegated/fake:{FAKE_INFOBLOX_FQDN}/default"),
                fqdn: FAKE_INFOBLOX_FQDN.to_string(),
                delegate_to: Vec::new(),
            });
        }
        fake
    }

    /// A fake seeded with a delegated zone, for tests.
    #[must_use]
    pub fn with_zone(fqdn: &str, delegate_to: Vec<NameServer>) -> Self {
        let fake = Self::default();
        {
            let mut state = fake.state.lock().expect("fake infoblox poisoned");
            state.zone = Some(ZoneDelegated {
                ref_: format!("zone_delegated/fake:{fqdn}/default"),
                fqdn: fqdn.to_string(),
                delegate_to,
            });
        }
        fake
    }

    /// Current `delegate_to` list, for assertions.
    #[must_use]
    pub fn delegate_to(&self) -> Vec<NameServer> {
        self.state
            .lock()
            .expect("fake infoblox poisoned")
            .zone
            .as_ref()
            .map(|z| z.delegate_to.clone())
            .unwrap_or_default()
    }

    /// Current TXT payload of `name`, for assertions.
    #[must_use]
    pub fn txt_text(&self, name: &str) -> Option<String> {
        self.state
            .lock()
            .expect("fake infoblox poisoned")
            .txt
            .get(name)
            .map(|r| r.text.clone())
    }

    /// True when no delegated zone exists, for assertions.
    #[must_use]
    pub fn zone_deleted(&self) -> bool {
        self.state
            .lock()
            .expect("fake infoblox poisoned")
            .zone
            .is_none()
    }
}

#[async_trait]
impl InfobloxObjectApi for FakeInfoblox {
    async fn get_zone_delegated(&self, fqdn: &str) -> Result<Option<ZoneDelegated>, DnsError> {
        debug!(fqdn, "fake infoblox: get_zone_delegated");
        Ok(self.state.lock().expect("fake infoblox poisoned").zone.clone())
    }

    async fn create_zone_delegated(
        &self,
        fqdn: &str,
        delegate_to: &[NameServer],
    ) -> Result<(), DnsError> {
        let mut state = self.state.lock().expect("fake infoblox poisoned");
        state.zone = Some(ZoneDelegated {
            ref_: format!("zone_delegated/fake:{fqdn}/default"),
            fqdn: fqdn.to_string(),
            delegate_to: delegate_to.to_vec(),
        });
        Ok(())
    }

    async fn update_zone_delegated(
        &self,
        _ref: &str,
        delegate_to: &[NameServer],
    ) -> Result<(), DnsError> {
        let mut state = self.state.lock().expect("fake infoblox poisoned");
        if let Some(zone) = state.zone.as_mut() {
            zone.delegate_to = delegate_to.to_vec();
        }
        Ok(())
    }

    async fn delete_zone_delegated(&self, _ref: &str) -> Result<(), DnsError> {
        self.state.lock().expect("fake infoblox poisoned").zone = None;
        Ok(())
    }

    async fn get_txt_record(&self, name: &str) -> Result<Option<TxtRecord>, DnsError> {
        Ok(self
            .state
            .lock()
            .expect("fake infoblox poisoned")
            .txt
            .get(name)
            .cloned())
    }

    async fn create_txt_record(&self, name: &str, text: &str, _ttl: u32) -> Result<(), DnsError> {
        let mut state = self.state.lock().expect("fake infoblox poisoned");
        state.next_ref += 1;
        let record = TxtRecord {
            ref_: format!("record:txt/fake:{}:{name}/default", state.next_ref),
            name: name.to_string(),
            text: text.to_string(),
        };
        state.txt.insert(name.to_string(), record);
        Ok(())
    }

    async fn update_txt_record(&self, ref_: &str, text: &str) -> Result<(), DnsError> {
        let mut state = self.state.lock().expect("fake infoblox poisoned");
        for record in state.txt.values_mut() {
            if record.ref_ == ref_ {
                record.text = text.to_string();
            }
        }
        Ok(())
    }

    async fn delete_txt_record(&self, ref_: &str) -> Result<(), DnsError> {
        let mut state = self.state.lock().expect("fake infoblox poisoned");
        state.txt.retain(|_, record| record.ref_ != ref_);
        Ok(())
    }
}
