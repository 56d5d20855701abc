//! XML REST client for the library services platform: bib, holding and item
//! creation under `<api url>/almaws/v1/bibs`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use bib_ingest_core::contract::{
    BibRequest, CreatedBib, CreatedHolding, CreatedItem, HoldingRequest, ItemData, ItemRequest,
    Platform,
};
use bib_ingest_core::error::ServiceError;
use bib_ingest_core::marc::{strip_namespaces, MarcRecord};
use quick_xml::events::BytesText;
use quick_xml::Writer;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use tracing::{debug, info};

use crate::xml::{child_texts, first_text_in};

/// `item_data` children in the order the platform expects them.
pub fn item_fields(item: &ItemData) -> Vec<(&'static str, String)> {
    let mut fields = vec![
        ("base_status", item.base_status.clone()),
        ("physical_material_type", item.physical_material_type.clone()),
        ("policy", item.policy.clone()),
    ];
    if let Some(po_line) = &item.po_line {
        fields.push(("po_line", po_line.clone()));
    }
    fields.push(("arrival_date", item.arrival_date.format("%Y-%m-%d").to_string()));
    fields.push(("library", item.library.clone()));
    fields.push(("location", item.location.clone()));
    if let Some(department) = &item.work_order_department {
        fields.push(("process_type", "WORK_ORDER_DEPARTMENT".to_string()));
        fields.push(("work_order_at", department.clone()));
    }
    fields
}

pub fn item_body(holding_id: &str, fields: &[(&'static str, String)]) -> Result<String, quick_xml::Error> {
    let mut writer = Writer::new(Vec::new());
    writer.create_element("item").write_inner_content(|w| {
        w.create_element("holding_data").write_inner_content(|w| {
            w.create_element("holding_id")
                .write_text_content(BytesText::new(holding_id))?;
            Ok::<(), quick_xml::Error>(())
        })?;
        w.create_element("item_data").write_inner_content(|w| {
            for (name, value) in fields {
                w.create_element(*name).write_text_content(BytesText::new(value))?;
            }
            Ok::<(), quick_xml::Error>(())
        })?;
        Ok::<(), quick_xml::Error>(())
    })?;
    Ok(String::from_utf8_lossy(&writer.into_inner()).into_owned())
}

/// Wrap a MARC record in the platform's envelope (`<bib>`, `<holding>`).
pub fn record_body(envelope: &str, record: &MarcRecord) -> Result<String, ServiceError> {
    let marcxml = strip_namespaces(&record.to_marcxml()?);
    Ok(format!("<{envelope}>{marcxml}</{envelope}>"))
}

/// Sent fields that the created item echoes back missing or blank.
///
/// Values are not compared: the platform normalises some of them on the way
/// back (`arrival_date` gains a zone suffix, codes gain a `desc` attribute).
pub fn ignored_fields(sent: &[(&'static str, String)], echoed: &BTreeMap<String, String>) -> Vec<String> {
    sent.iter()
        .filter(|(name, value)| {
            echoed
                .get(*name)
                .map_or(true, |got| got.trim().is_empty() && !value.trim().is_empty())
        })
        .map(|(name, _)| name.to_string())
        .collect()
}

pub struct PlatformClient {
    http: reqwest::Client,
    base: String,
    api_key: String,
}

impl PlatformClient {
    pub fn new(http: reqwest::Client, api_url: &str, api_key: String) -> Self {
        Self {
            http,
            base: format!("{}/almaws/v1", api_url.trim_end_matches('/')),
            api_key,
        }
    }

    async fn post_xml(&self, path: &str, body: String) -> Result<String, ServiceError> {
        let url = format!("{}{}", self.base, path);
        debug!(%url, bytes = body.len(), "POST");
        let response = self
            .http
            .post(&url)
            .header(AUTHORIZATION, format!("apikey {}", self.api_key))
            .header(CONTENT_TYPE, "application/xml")
            .header(ACCEPT, "application/xml")
            .body(body)
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            let message = first_text_in(&text, "error", "errorMessage")
                .ok()
                .flatten()
                .unwrap_or_else(|| text.chars().take(200).collect());
            return Err(format!("HTTP {}: {}", status.as_u16(), message.trim()).into());
        }
        Ok(text)
    }
}

fn required(xml: &str, parent: &str, child: &str) -> Result<String, ServiceError> {
    first_text_in(xml, parent, child)?
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| format!("response has no {parent}/{child}").into())
}

#[async_trait]
impl Platform for PlatformClient {
    async fn create_bib(&self, req: &BibRequest) -> Result<CreatedBib, ServiceError> {
        let body = record_body("bib", &req.record)?;
        let response = self.post_xml("/bibs", body).await?;
        let bib_id = required(&response, "bib", "mms_id")?;
        info!(%bib_id, "Bib created");
        Ok(CreatedBib { bib_id })
    }

    async fn create_holding(&self, req: &HoldingRequest) -> Result<CreatedHolding, ServiceError> {
        let body = record_body("holding", &req.record)?;
        let path = format!("/bibs/{}/holdings", req.bib_id);
        let response = self.post_xml(&path, body).await?;
        let holding_id = required(&response, "holding", "holding_id")?;
        info!(bib_id = %req.bib_id, location = %req.location, %holding_id, "Holding created");
        Ok(CreatedHolding { holding_id })
    }

    async fn create_item(&self, req: &ItemRequest) -> Result<CreatedItem, ServiceError> {
        let fields = item_fields(&req.item);
        let body = item_body(&req.holding_id, &fields)?;
        let path = format!("/bibs/{}/holdings/{}/items", req.bib_id, req.holding_id);
        let response = self.post_xml(&path, body).await?;
        let item_id = required(&response, "item_data", "pid")?;
        let echoed = child_texts(&response, "item_data")?;
        Ok(CreatedItem {
            item_id,
            ignored_fields: ignored_fields(&fields, &echoed),
        })
    }
}
