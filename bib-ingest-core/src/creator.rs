//! Resource creation in the target platform: bib, then one holding per
//! configured location, then the items of each holding.
//!
//! A bib failure stops the record. Holding and item failures are captured per
//! location and never stop the remaining locations. Nothing created here is
//! rolled back.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::allocator::CallNumber;
use crate::contract::{BibRequest, HoldingRequest, ItemData, ItemRequest, Platform};
use crate::marc::{DataField, MarcRecord};
use crate::record::MappedRecord;
use crate::validate::SchemaValidator;

pub const HOLDING_LEADER: &str = "00000nx  a2200061zn 4500";
pub const HOLDING_008: &str = "1011252u 8 4001uueng0000000";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceStatus {
    Created,
    Failed,
    /// Rejected by validation before any request was sent.
    Invalid,
    /// Not attempted because its parent failed.
    Skipped,
    Simulated,
    NotAttempted,
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceStatus::Created => "CREATED",
            ResourceStatus::Failed => "FAILED",
            ResourceStatus::Invalid => "INVALID",
            ResourceStatus::Skipped => "SKIPPED",
            ResourceStatus::Simulated => "SIMULATED",
            ResourceStatus::NotAttempted => "NOT_ATTEMPTED",
        };
        f.write_str(s)
    }
}

/// Item policy for one shelving location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationPolicy {
    pub code: String,
    pub base_status: String,
    pub item_policy: String,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

fn default_quantity() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HoldingConfig {
    pub library_code: String,
    pub locations: Vec<LocationPolicy>,
}

impl Default for HoldingConfig {
    fn default() -> Self {
        Self {
            library_code: "hph_bjnbecip".to_string(),
            locations: vec![
                LocationPolicy {
                    code: "E02XA".to_string(),
                    base_status: "70".to_string(),
                    item_policy: "70".to_string(),
                    quantity: 1,
                },
                LocationPolicy {
                    code: "E02SP".to_string(),
                    base_status: "04".to_string(),
                    item_policy: "04".to_string(),
                    quantity: 1,
                },
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemConfig {
    pub material_type_code: String,
    /// Puts every new item on a work order for this department.
    pub department_code: Option<String>,
    pub po_line: Option<String>,
}

impl Default for ItemConfig {
    fn default() -> Self {
        Self {
            material_type_code: "THESIS".to_string(),
            department_code: Some("AcqDepthph_bjnbecip".to_string()),
            po_line: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemOutcome {
    pub status: ResourceStatus,
    pub item_id: Option<String>,
    pub error: Option<String>,
}

impl ItemOutcome {
    fn with_status(status: ResourceStatus) -> Self {
        Self {
            status,
            item_id: None,
            error: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HoldingOutcome {
    pub location: String,
    pub status: ResourceStatus,
    pub holding_id: Option<String>,
    pub error: Option<String>,
    pub items: Vec<ItemOutcome>,
}

/// What happened to one record in the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreationOutcome {
    pub bib_status: ResourceStatus,
    pub bib_id: Option<String>,
    pub bib_error: Option<String>,
    pub holdings: Vec<HoldingOutcome>,
    pub warnings: Vec<String>,
    pub simulated: bool,
}

impl CreationOutcome {
    /// A record rejected before creation (validation, mapping).
    pub fn rejected(status: ResourceStatus, reason: impl Into<String>) -> Self {
        Self {
            bib_status: status,
            bib_id: None,
            bib_error: Some(reason.into()),
            holdings: Vec::new(),
            warnings: Vec::new(),
            simulated: false,
        }
    }

    pub fn not_attempted() -> Self {
        Self {
            bib_status: ResourceStatus::NotAttempted,
            bib_id: None,
            bib_error: None,
            holdings: Vec::new(),
            warnings: Vec::new(),
            simulated: false,
        }
    }

    /// True when the bib and every holding and item were created.
    pub fn is_complete(&self) -> bool {
        self.bib_status == ResourceStatus::Created
            && self.holdings.iter().all(|h| {
                h.status == ResourceStatus::Created
                    && h.items.iter().all(|i| i.status == ResourceStatus::Created)
            })
    }
}

/// MARC holding record carrying the call number in `852 $j`.
pub fn build_holding_record(library: &str, location: &str, call_number: &CallNumber) -> MarcRecord {
    let mut record = MarcRecord::new(HOLDING_LEADER);
    record.add_control_field("008", HOLDING_008);
    record.add_field(
        DataField::new("852", '4', ' ')
            .with_subfield('b', library)
            .with_subfield('c', location)
            .with_subfield('j', call_number.as_str()),
    );
    record
}

pub struct ResourceCreator<'a> {
    platform: &'a dyn Platform,
    validator: Option<&'a dyn SchemaValidator>,
    holdings: &'a HoldingConfig,
    items: &'a ItemConfig,
    arrival_date: NaiveDate,
}

impl<'a> ResourceCreator<'a> {
    pub fn new(
        platform: &'a dyn Platform,
        validator: Option<&'a dyn SchemaValidator>,
        holdings: &'a HoldingConfig,
        items: &'a ItemConfig,
        arrival_date: NaiveDate,
    ) -> Self {
        Self {
            platform,
            validator,
            holdings,
            items,
            arrival_date,
        }
    }

    fn item_request(&self, bib_id: &str, holding_id: &str, policy: &LocationPolicy) -> ItemRequest {
        ItemRequest {
            bib_id: bib_id.to_string(),
            holding_id: holding_id.to_string(),
            item: ItemData {
                base_status: policy.base_status.clone(),
                physical_material_type: self.items.material_type_code.clone(),
                policy: policy.item_policy.clone(),
                po_line: self.items.po_line.clone(),
                arrival_date: self.arrival_date,
                library: self.holdings.library_code.clone(),
                location: policy.code.clone(),
                work_order_department: self.items.department_code.clone(),
            },
        }
    }

    /// Create bib, holdings and items for a record that passed every check.
    pub async fn create(&self, record: &MappedRecord, call_number: &CallNumber) -> CreationOutcome {
        let source_id = record.source_id.as_str();
        let mut outcome = CreationOutcome::not_attempted();

        info!(source_id, call_number = %call_number, "[CREATE] Creating bib");
        let bib_id = match self
            .platform
            .create_bib(&BibRequest {
                record: record.record.clone(),
            })
            .await
        {
            Ok(created) => {
                info!(source_id, bib_id = %created.bib_id, "[CREATE] Bib created");
                created.bib_id
            }
            Err(e) => {
                error!(source_id, error = %e, "[CREATE][ERROR] Bib creation failed");
                outcome.bib_status = ResourceStatus::Failed;
                outcome.bib_error = Some(e.to_string());
                return outcome;
            }
        };
        outcome.bib_status = ResourceStatus::Created;
        outcome.bib_id = Some(bib_id.clone());

        for policy in &self.holdings.locations {
            let holding = self
                .create_holding(source_id, &bib_id, policy, call_number, &mut outcome.warnings)
                .await;
            outcome.holdings.push(holding);
        }
        outcome
    }

    async fn create_holding(
        &self,
        source_id: &str,
        bib_id: &str,
        policy: &LocationPolicy,
        call_number: &CallNumber,
        warnings: &mut Vec<String>,
    ) -> HoldingOutcome {
        let location = policy.code.as_str();
        let skipped_items = || -> Vec<ItemOutcome> {
            (0..policy.quantity)
                .map(|_| ItemOutcome::with_status(ResourceStatus::Skipped))
                .collect()
        };

        let record = build_holding_record(&self.holdings.library_code, location, call_number);
        if let Some(Err(problems)) = self.validator.map(|v| v.validate_holding(&record)) {
            let reason = format!("invalid holding: {}", problems.join("; "));
            error!(source_id, location, %reason, "[CREATE][ERROR] Holding rejected by validation");
            return HoldingOutcome {
                location: location.to_string(),
                status: ResourceStatus::Failed,
                holding_id: None,
                error: Some(reason),
                items: skipped_items(),
            };
        }

        let request = HoldingRequest {
            bib_id: bib_id.to_string(),
            library: self.holdings.library_code.clone(),
            location: location.to_string(),
            record,
        };
        let holding_id = match self.platform.create_holding(&request).await {
            Ok(created) => {
                info!(source_id, location, holding_id = %created.holding_id, "[CREATE] Holding created");
                created.holding_id
            }
            Err(e) => {
                error!(source_id, location, error = %e, "[CREATE][ERROR] Holding creation failed");
                return HoldingOutcome {
                    location: location.to_string(),
                    status: ResourceStatus::Failed,
                    holding_id: None,
                    error: Some(e.to_string()),
                    items: skipped_items(),
                };
            }
        };

        let mut items = Vec::with_capacity(policy.quantity as usize);
        for _ in 0..policy.quantity {
            let request = self.item_request(bib_id, &holding_id, policy);
            items.push(self.create_item(source_id, &request, warnings).await);
        }

        HoldingOutcome {
            location: location.to_string(),
            status: ResourceStatus::Created,
            holding_id: Some(holding_id),
            error: None,
            items,
        }
    }

    async fn create_item(
        &self,
        source_id: &str,
        request: &ItemRequest,
        warnings: &mut Vec<String>,
    ) -> ItemOutcome {
        let location = request.item.location.as_str();
        if let Some(Err(problems)) = self.validator.map(|v| v.validate_item(request)) {
            let reason = format!("invalid item: {}", problems.join("; "));
            error!(source_id, location, %reason, "[CREATE][ERROR] Item rejected by validation");
            return ItemOutcome {
                status: ResourceStatus::Failed,
                item_id: None,
                error: Some(reason),
            };
        }

        match self.platform.create_item(request).await {
            Ok(created) => {
                info!(source_id, location, item_id = %created.item_id, "[CREATE] Item created");
                if !created.ignored_fields.is_empty() {
                    let warning = format!(
                        "item {} at {}: fields silently ignored by the platform: {}",
                        created.item_id,
                        location,
                        created.ignored_fields.join(", ")
                    );
                    warn!(source_id, %warning, "[CREATE] Item fields ignored");
                    warnings.push(warning);
                }
                ItemOutcome {
                    status: ResourceStatus::Created,
                    item_id: Some(created.item_id),
                    error: None,
                }
            }
            Err(e) => {
                error!(source_id, location, error = %e, "[CREATE][ERROR] Item creation failed");
                ItemOutcome {
                    status: ResourceStatus::Failed,
                    item_id: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Dry-run outcome: every step reported as simulated, no request issued.
    pub fn simulate(&self, record: &MappedRecord) -> CreationOutcome {
        info!(source_id = %record.source_id, "[CREATE] Dry run, creation simulated");
        let holdings = self
            .holdings
            .locations
            .iter()
            .map(|policy| HoldingOutcome {
                location: policy.code.clone(),
                status: ResourceStatus::Simulated,
                holding_id: None,
                error: None,
                items: (0..policy.quantity)
                    .map(|_| ItemOutcome::with_status(ResourceStatus::Simulated))
                    .collect(),
            })
            .collect();
        CreationOutcome {
            bib_status: ResourceStatus::Simulated,
            bib_id: None,
            bib_error: None,
            holdings,
            warnings: Vec::new(),
            simulated: true,
        }
    }
}
