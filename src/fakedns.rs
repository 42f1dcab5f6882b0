// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Fake DNS server used for external DNS communication tests.
//!
//! Answers A and TXT queries for `example.com.` from a fixed record table
//! over UDP on 127.0.0.1:7753. Started in-process only when
//! `OVERRIDE_FAKE_DNS` is enabled; the core never assumes its presence.

use crate::constants::{FAKE_DNS_PORT, FAKE_DNS_ZONE, HEARTBEAT_TIMESTAMP_FORMAT};
use async_trait::async_trait;
use chrono::Utc;
use hickory_proto::op::{Header, ResponseCode};
use hickory_proto::rr::rdata::{A, TXT};
use hickory_proto::rr::{Name, RData, Record, RecordType};
use hickory_server::authority::MessageResponseBuilder;
use hickory_server::server::{Request, RequestHandler, ResponseHandler, ResponseInfo};
use hickory_server::ServerFuture;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::str::FromStr;
use tokio::net::UdpSocket;
use tracing::{debug, error, info};

/// Record table keyed by FQDN; values are IPv4 literals for A answers and
/// timestamp literals for TXT answers.
pub struct FakeDns {
    records: HashMap<String, Vec<String>>,
}

impl FakeDns {
    /// An empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: HashMap::new(),
        }
    }

    /// The table the lifecycle tests expect: one peer with localtargets and
    /// two heartbeats, one stale and one fresh relative to startup.
    #[must_use]
    pub fn with_default_records() -> Self {
        let mut fake = Self::new();
        fake.insert(
            "localtargets-roundrobin.cloud.example.com.",
            &["10.1.0.3", "10.1.0.2", "10.1.0.1"],
        );
        fake.insert(
            "test-gslb-heartbeat-eu.example.com.",
            &[&old_edge_timestamp(10)],
        );
        fake.insert(
            "test-gslb-heartbeat-za.example.com.",
            &[&old_edge_timestamp(3)],
        );
        fake
    }

    /// Add or replace the answers of a name.
    pub fn insert(&mut self, fqdn: &str, values: &[&str]) {
        self.records.insert(
            fqdn.to_string(),
            values.iter().map(ToString::to_string).collect(),
        );
    }

    fn answers(&self, qname: &str, qtype: RecordType) -> Vec<Record> {
        if !qname.ends_with(FAKE_DNS_ZONE) {
            return Vec::new();
        }
        let Some(values) = self.records.get(qname) else {
            return Vec::new();
        };
        let Ok(name) = Name::from_ascii(qname) else {
            return Vec::new();
        };

        let mut records = Vec::new();
        for value in values {
            match qtype {
                RecordType::A => {
                    if let Ok(ip) = Ipv4Addr::from_str(value) {
                        records.push(Record::from_rdata(name.clone(), 30, RData::A(A(ip))));
                    }
                }
                RecordType::TXT => {
                    records.push(Record::from_rdata(
                        name.clone(),
                        30,
                        RData::TXT(TXT::new(vec![value.clone()])),
                    ));
                }
                _ => {}
            }
        }
        records
    }
}

impl Default for FakeDns {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RequestHandler for FakeDns {
    async fn handle_request<R: ResponseHandler>(
        &self,
        request: &Request,
        mut response_handle: R,
    ) -> ResponseInfo {
        let query = request.query();
        let qname = query.name().to_string();
        debug!(name = %qname, qtype = %query.query_type(), "Query");

        let records = self.answers(&qname, query.query_type());
        let builder = MessageResponseBuilder::from_message_request(request);
        let mut header = Header::response_from_request(request.header());
        header.set_authoritative(true);
        let response = builder.build(
            header,
            records.iter(),
            std::iter::empty(),
            std::iter::empty(),
            std::iter::empty(),
        );

        match response_handle.send_response(response).await {
            Ok(info) => info,
            Err(e) => {
                error!(error = %e, "Failed to write message");
                let mut header = Header::response_from_request(request.header());
                header.set_response_code(ResponseCode::ServFail);
                header.into()
            }
        }
    }
}

/// A heartbeat timestamp `minutes` in the past, UTC.
#[must_use]
pub fn old_edge_timestamp(minutes: i64) -> String {
    (Utc::now() - chrono::Duration::minutes(minutes))
        .format(HEARTBEAT_TIMESTAMP_FORMAT)
        .to_string()
}

/// Serve `handler` on an already-bound socket until shutdown.
///
/// # Errors
///
/// Returns an error when the server loop terminates abnormally.
pub async fn serve_on(handler: FakeDns, socket: UdpSocket) -> anyhow::Result<()> {
    let mut server = ServerFuture::new(handler);
    server.register_socket(socket);
    server.block_until_done().await?;
    Ok(())
}

/// Start the fake DNS server in the background on 127.0.0.1:7753.
pub fn spawn() {
    tokio::spawn(async {
        let socket = match UdpSocket::bind(("127.0.0.1", FAKE_DNS_PORT)).await {
            Ok(socket) => socket,
            Err(e) => {
                error!(error = %e, port = FAKE_DNS_PORT, "Failed to bind fakeDNS server");
                return;
            }
        };
        info!(port = FAKE_DNS_PORT, "Starting fakeDNS server");
        if let Err(e) = serve_on(FakeDns::with_default_records(), socket).await {
            error!(error = %e, "fakeDNS server failed");
        }
    });
}

#[cfg(test)]
#[path = "fakedns_tests.rs"]
mod fakedns_tests;
