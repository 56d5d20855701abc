use std::sync::atomic::{AtomicU32, Ordering};

use bib_ingest_core::allocator::{CallNumberFormat, RetryPolicy};
use bib_ingest_core::config::PipelineConfig;
use bib_ingest_core::contract::{
    CatalogRecordRef, CreatedBib, CreatedHolding, CreatedItem, MockCatalogLookup,
    MockCounterSource, MockPageSource, MockPlatform, PageRequest,
};
use bib_ingest_core::creator::{HoldingConfig, LocationPolicy, ResourceStatus};
use bib_ingest_core::error::PipelineError;
use bib_ingest_core::harvest::HarvestMode;
use bib_ingest_core::lookup::MatchStatus;
use bib_ingest_core::marc::{DataField, MarcRecord};
use bib_ingest_core::pipeline::{run, Services};
use bib_ingest_core::record::SourceRecord;
use bib_ingest_core::report::{RecordStatus, Report};
use bib_ingest_core::validate::StructuralValidator;
use chrono::NaiveDate;

fn thesis(id: u32) -> SourceRecord {
    let mut marc = MarcRecord::new("00000nam a2200000 c 4500");
    marc.add_control_field("001", id.to_string());
    marc.add_field(
        DataField::new("245", '1', '0').with_subfield('a', format!("Thesis <i>number</i> {id}")),
    );
    marc.add_field(DataField::new("700", '1', ' ').with_subfield('a', "Doe, Jane"));
    marc.add_field(
        DataField::new("260", ' ', ' ')
            .with_subfield('a', "Lausanne")
            .with_subfield('b', "EPFL")
            .with_subfield('c', "2024"),
    );
    SourceRecord::new(marc)
}

fn untitled(id: u32) -> SourceRecord {
    let mut marc = MarcRecord::new("00000nam a2200000 c 4500");
    marc.add_control_field("001", id.to_string());
    marc.add_field(DataField::new("700", '1', ' ').with_subfield('a', "Doe, Jane"));
    SourceRecord::new(marc)
}

fn config() -> PipelineConfig {
    PipelineConfig {
        harvest_mode: HarvestMode::Paginated {
            start_page: 1,
            page_size: 10,
        },
        counter_retry: RetryPolicy {
            attempts: 3,
            backoff_ms: 0,
        },
        call_number: CallNumberFormat {
            prefix: "ZTK".into(),
            separator: String::new(),
        },
        last_value_file: None,
        run_date: NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
        ..PipelineConfig::default()
    }
}

/// One page holding `records`, then an empty page.
fn single_page(records: fn() -> Vec<SourceRecord>) -> MockPageSource {
    let mut pages = MockPageSource::new();
    pages.expect_fetch_page().times(2).returning(move |req| match req {
        PageRequest::Paged { page: 1, .. } => Ok(records()),
        _ => Ok(vec![]),
    });
    pages
}

fn counter(value: u64) -> MockCounterSource {
    let mut counter = MockCounterSource::new();
    counter
        .expect_fetch_last_issued()
        .times(1)
        .returning(move || Ok(value));
    counter
}

fn catalog_without_matches() -> MockCatalogLookup {
    let mut catalog = MockCatalogLookup::new();
    catalog.expect_lookup().returning(|_| Ok(None));
    catalog
}

fn accepting_platform() -> MockPlatform {
    let bibs = AtomicU32::new(0);
    let mut platform = MockPlatform::new();
    platform.expect_create_bib().returning(move |_| {
        let n = bibs.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(CreatedBib {
            bib_id: format!("99{n}"),
        })
    });
    platform.expect_create_holding().returning(|req| {
        Ok(CreatedHolding {
            holding_id: format!("22{}", req.location),
        })
    });
    platform.expect_create_item().returning(|req| {
        Ok(CreatedItem {
            item_id: format!("23{}", req.item.location),
            ignored_fields: vec![],
        })
    });
    platform
}

#[tokio::test]
async fn allocates_one_call_number_per_created_record() {
    let pages = single_page(|| vec![thesis(1), thesis(2), thesis(3)]);
    let counter = counter(42);
    let mut catalog = MockCatalogLookup::new();
    catalog.expect_lookup().times(3).returning(|q| {
        if q.source_id == "2" {
            Ok(Some(CatalogRecordRef {
                external_id: "991000".into(),
                title: Some(q.title.clone()),
                author: Some(q.author.clone()),
                publisher: None,
                year: None,
            }))
        } else {
            Ok(None)
        }
    });
    let mut platform = MockPlatform::new();
    platform.expect_create_bib().times(2).returning(|req| {
        Ok(CreatedBib {
            bib_id: format!("99{}", req.record.control_field("001").unwrap_or("")),
        })
    });
    platform.expect_create_holding().times(4).returning(|req| {
        Ok(CreatedHolding {
            holding_id: format!("22{}", req.location),
        })
    });
    platform.expect_create_item().times(4).returning(|_| {
        Ok(CreatedItem {
            item_id: "23".into(),
            ignored_fields: vec![],
        })
    });

    let services = Services {
        pages: &pages,
        catalog: &catalog,
        counter: &counter,
        platform: &platform,
        validator: &StructuralValidator,
    };
    let mut report = Report::new();
    let summary = run(&config(), &services, &mut report).await.unwrap();

    assert_eq!(summary.records, 3);
    assert_eq!(summary.call_numbers_allocated, 2);
    assert_eq!(summary.count(RecordStatus::Created), 2);
    assert_eq!(summary.count(RecordStatus::SkippedMatch), 1);

    let rows = report.rows();
    assert_eq!(rows[0].call_number.as_ref().unwrap().as_str(), "ZTK43");
    assert_eq!(rows[0].outcome.bib_id.as_deref(), Some("991"));
    assert_eq!(rows[0].title.as_deref(), Some("Thesis number 1"));

    assert_eq!(rows[1].call_number, None);
    assert_eq!(rows[1].match_status, MatchStatus::Found);
    assert_eq!(rows[1].match_id.as_deref(), Some("991000"));
    assert_eq!(rows[1].outcome.bib_status, ResourceStatus::NotAttempted);

    assert_eq!(rows[2].call_number.as_ref().unwrap().as_str(), "ZTK44");
}

#[tokio::test]
async fn dry_run_issues_no_mutating_call() {
    let pages = single_page(|| vec![thesis(1), thesis(2)]);
    let counter = counter(10);
    let mut catalog = MockCatalogLookup::new();
    catalog.expect_lookup().times(2).returning(|_| Ok(None));
    let mut platform = MockPlatform::new();
    platform.expect_create_bib().never();
    platform.expect_create_holding().never();
    platform.expect_create_item().never();

    let services = Services {
        pages: &pages,
        catalog: &catalog,
        counter: &counter,
        platform: &platform,
        validator: &StructuralValidator,
    };
    let config = PipelineConfig {
        dry_run: true,
        ..config()
    };
    let mut report = Report::new();
    let summary = run(&config, &services, &mut report).await.unwrap();

    assert_eq!(summary.call_numbers_allocated, 0);
    assert_eq!(summary.count(RecordStatus::Simulated), 2);
    for row in report.rows() {
        assert!(row.outcome.simulated);
        assert_eq!(row.call_number, None);
        assert_eq!(row.match_status, MatchStatus::NotFound);
    }
}

#[tokio::test]
async fn failed_holding_leaves_the_record_partial() {
    let pages = single_page(|| vec![thesis(7)]);
    let counter = counter(42);
    let catalog = catalog_without_matches();
    let mut platform = MockPlatform::new();
    platform.expect_create_bib().times(1).returning(|_| {
        Ok(CreatedBib {
            bib_id: "9907".into(),
        })
    });
    platform.expect_create_holding().times(2).returning(|req| {
        if req.location == "E02XA" {
            Err("HTTP 400: location not allowed".into())
        } else {
            Ok(CreatedHolding {
                holding_id: "2207".into(),
            })
        }
    });
    let items = AtomicU32::new(0);
    platform
        .expect_create_item()
        .withf(|req| req.holding_id == "2207" && req.item.location == "E02SP")
        .times(2)
        .returning(move |_| {
            let n = items.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(CreatedItem {
                item_id: format!("23{n}"),
                ignored_fields: vec![],
            })
        });

    let mut config = config();
    config.holdings = HoldingConfig {
        library_code: "hph_bjnbecip".into(),
        locations: vec![
            LocationPolicy {
                code: "E02XA".into(),
                base_status: "70".into(),
                item_policy: "70".into(),
                quantity: 1,
            },
            LocationPolicy {
                code: "E02SP".into(),
                base_status: "04".into(),
                item_policy: "04".into(),
                quantity: 2,
            },
        ],
    };

    let services = Services {
        pages: &pages,
        catalog: &catalog,
        counter: &counter,
        platform: &platform,
        validator: &StructuralValidator,
    };
    let mut report = Report::new();
    run(&config, &services, &mut report).await.unwrap();

    let row = &report.rows()[0];
    assert_eq!(row.record_status, RecordStatus::Partial);
    let [failed, created] = &row.outcome.holdings[..] else {
        panic!("expected two holdings, got {:?}", row.outcome.holdings);
    };
    assert_eq!(failed.status, ResourceStatus::Failed);
    assert_eq!(failed.items[0].status, ResourceStatus::Skipped);
    assert_eq!(created.status, ResourceStatus::Created);
    assert_eq!(created.items.len(), 2);
    assert!(created
        .items
        .iter()
        .all(|i| i.status == ResourceStatus::Created));
    assert_eq!(row.call_number.as_ref().unwrap().as_str(), "ZTK43");
}

#[tokio::test]
async fn counter_failure_aborts_before_harvest() {
    let mut pages = MockPageSource::new();
    pages.expect_fetch_page().never();
    let mut counter = MockCounterSource::new();
    counter
        .expect_fetch_last_issued()
        .times(3)
        .returning(|| Err("HTTP 503".into()));
    let catalog = MockCatalogLookup::new();
    let platform = MockPlatform::new();

    let services = Services {
        pages: &pages,
        catalog: &catalog,
        counter: &counter,
        platform: &platform,
        validator: &StructuralValidator,
    };
    let mut report = Report::new();
    let err = run(&config(), &services, &mut report).await.unwrap_err();
    assert!(matches!(err, PipelineError::Allocator(ref e) if e.attempts == 3));
    assert!(report.rows().is_empty());
}

#[tokio::test]
async fn mapping_failure_is_confined_to_its_record() {
    let pages = single_page(|| vec![untitled(1), thesis(2)]);
    let counter = counter(0);
    let mut catalog = MockCatalogLookup::new();
    catalog
        .expect_lookup()
        .withf(|q| q.source_id == "2")
        .times(1)
        .returning(|_| Ok(None));
    let platform = accepting_platform();

    let services = Services {
        pages: &pages,
        catalog: &catalog,
        counter: &counter,
        platform: &platform,
        validator: &StructuralValidator,
    };
    let mut report = Report::new();
    let summary = run(&config(), &services, &mut report).await.unwrap();

    let rows = report.rows();
    assert_eq!(rows[0].record_status, RecordStatus::Failed);
    assert_eq!(rows[0].outcome.bib_status, ResourceStatus::Invalid);
    assert_eq!(rows[0].match_status, MatchStatus::NotChecked);
    assert_eq!(rows[0].call_number, None);
    assert!(rows[0].errors[0].contains("245$a"));
    assert_eq!(rows[1].record_status, RecordStatus::Created);
    assert_eq!(rows[1].call_number.as_ref().unwrap().as_str(), "ZTK1");
    assert_eq!(summary.call_numbers_allocated, 1);
}

#[tokio::test]
async fn harvest_failure_keeps_rows_already_produced() {
    let mut pages = MockPageSource::new();
    pages.expect_fetch_page().times(2).returning(|req| match req {
        PageRequest::Paged { page: 1, .. } => Ok(vec![thesis(1)]),
        _ => Err("connection reset by peer".into()),
    });
    let counter = counter(5);
    let catalog = catalog_without_matches();
    let platform = accepting_platform();

    let services = Services {
        pages: &pages,
        catalog: &catalog,
        counter: &counter,
        platform: &platform,
        validator: &StructuralValidator,
    };
    let mut report = Report::new();
    let err = run(&config(), &services, &mut report).await.unwrap_err();
    assert!(matches!(err, PipelineError::Harvest(_)));
    assert_eq!(report.rows().len(), 1);
    assert_eq!(report.summary().call_numbers_allocated, 1);
}

#[tokio::test]
async fn record_limit_discards_the_rest_of_the_page() {
    let mut pages = MockPageSource::new();
    pages
        .expect_fetch_page()
        .times(1)
        .returning(|_| Ok((1..=10).map(thesis).collect()));
    let counter = counter(0);
    let catalog = catalog_without_matches();
    let platform = accepting_platform();

    let services = Services {
        pages: &pages,
        catalog: &catalog,
        counter: &counter,
        platform: &platform,
        validator: &StructuralValidator,
    };
    let config = PipelineConfig {
        max_records: Some(3),
        ..config()
    };
    let mut report = Report::new();
    let summary = run(&config, &services, &mut report).await.unwrap();
    assert_eq!(summary.records, 3);
    assert_eq!(summary.call_numbers_allocated, 3);
    assert_eq!(report.rows()[2].source_id.as_deref(), Some("3"));
}

#[tokio::test]
async fn disabled_existence_check_is_reported() {
    let pages = single_page(|| vec![thesis(1)]);
    let counter = counter(0);
    let mut catalog = MockCatalogLookup::new();
    catalog.expect_lookup().never();
    let platform = accepting_platform();

    let services = Services {
        pages: &pages,
        catalog: &catalog,
        counter: &counter,
        platform: &platform,
        validator: &StructuralValidator,
    };
    let config = PipelineConfig {
        existence_check: false,
        validation: false,
        ..config()
    };
    let mut report = Report::new();
    run(&config, &services, &mut report).await.unwrap();

    let row = &report.rows()[0];
    assert_eq!(row.match_status, MatchStatus::CheckSkipped);
    assert!(row.warnings.iter().any(|w| w.contains("existence check skipped")));
    assert!(row.warnings.iter().any(|w| w.contains("validation disabled")));
    assert_eq!(row.record_status, RecordStatus::Created);
}

#[tokio::test]
async fn harvested_leader_is_replaced_before_bib_rules_apply() {
    fn leaderless() -> Vec<SourceRecord> {
        let mut marc = MarcRecord::new("");
        marc.add_control_field("001", "5");
        marc.add_field(DataField::new("245", '1', '0').with_subfield('a', "Short leader"));
        marc.add_field(DataField::new("700", '1', ' ').with_subfield('a', "Doe, Jane"));
        vec![SourceRecord::new(marc)]
    }
    let pages = single_page(leaderless);
    let counter = counter(42);
    let catalog = catalog_without_matches();
    let mut platform = MockPlatform::new();
    platform
        .expect_create_bib()
        .withf(|req| req.record.leader.chars().count() == 24)
        .times(1)
        .returning(|_| {
            Ok(CreatedBib {
                bib_id: "9905".into(),
            })
        });
    platform.expect_create_holding().returning(|req| {
        Ok(CreatedHolding {
            holding_id: format!("22{}", req.location),
        })
    });
    platform.expect_create_item().returning(|_| {
        Ok(CreatedItem {
            item_id: "23".into(),
            ignored_fields: vec![],
        })
    });

    let services = Services {
        pages: &pages,
        catalog: &catalog,
        counter: &counter,
        platform: &platform,
        validator: &StructuralValidator,
    };
    let mut report = Report::new();
    run(&config(), &services, &mut report).await.unwrap();

    let row = &report.rows()[0];
    assert!(row.errors.is_empty(), "{:?}", row.errors);
    assert_eq!(row.record_status, RecordStatus::Created);
    assert_eq!(row.call_number.as_ref().unwrap().as_str(), "ZTK43");
}

#[tokio::test]
async fn failed_bib_keeps_its_call_number() {
    let pages = single_page(|| vec![thesis(1), thesis(2)]);
    let counter = counter(42);
    let catalog = catalog_without_matches();
    let mut platform = MockPlatform::new();
    platform.expect_create_bib().times(2).returning(|req| {
        match req.record.control_field("001") {
            Some("1") => Err("HTTP 400: invalid MARC".into()),
            _ => Ok(CreatedBib {
                bib_id: "9902".into(),
            }),
        }
    });
    platform
        .expect_create_holding()
        .withf(|req| req.bib_id == "9902")
        .returning(|req| {
            Ok(CreatedHolding {
                holding_id: format!("22{}", req.location),
            })
        });
    platform.expect_create_item().returning(|_| {
        Ok(CreatedItem {
            item_id: "23".into(),
            ignored_fields: vec![],
        })
    });

    let services = Services {
        pages: &pages,
        catalog: &catalog,
        counter: &counter,
        platform: &platform,
        validator: &StructuralValidator,
    };
    let mut report = Report::new();
    let summary = run(&config(), &services, &mut report).await.unwrap();

    let rows = report.rows();
    assert_eq!(rows[0].record_status, RecordStatus::Failed);
    assert_eq!(rows[0].outcome.bib_status, ResourceStatus::Failed);
    assert!(rows[0].outcome.holdings.is_empty());
    assert!(rows[0].errors.iter().any(|e| e.contains("invalid MARC")));
    assert_eq!(rows[0].call_number.as_ref().unwrap().as_str(), "ZTK43");

    assert_eq!(rows[1].record_status, RecordStatus::Created);
    assert_eq!(rows[1].call_number.as_ref().unwrap().as_str(), "ZTK44");
    assert_eq!(summary.call_numbers_allocated, 2);
}

#[tokio::test]
async fn unreachable_catalog_still_creates_the_record() {
    let pages = single_page(|| vec![thesis(1)]);
    let counter = counter(42);
    let mut catalog = MockCatalogLookup::new();
    catalog
        .expect_lookup()
        .times(1)
        .returning(|_| Err("SRU timeout".into()));
    let platform = accepting_platform();

    let services = Services {
        pages: &pages,
        catalog: &catalog,
        counter: &counter,
        platform: &platform,
        validator: &StructuralValidator,
    };
    let mut report = Report::new();
    let summary = run(&config(), &services, &mut report).await.unwrap();

    let row = &report.rows()[0];
    assert_eq!(row.match_status, MatchStatus::CheckFailed);
    assert!(row
        .warnings
        .iter()
        .any(|w| w.contains("existence check failed") && w.contains("SRU timeout")));
    assert_eq!(row.call_number.as_ref().unwrap().as_str(), "ZTK43");
    assert_eq!(row.record_status, RecordStatus::Created);
    assert_eq!(summary.call_numbers_allocated, 1);
}

#[tokio::test]
async fn exhausted_counter_fails_records_without_a_number() {
    let pages = single_page(|| vec![thesis(1)]);
    let counter = counter(u64::MAX);
    let catalog = catalog_without_matches();
    let mut platform = MockPlatform::new();
    platform.expect_create_bib().never();

    let services = Services {
        pages: &pages,
        catalog: &catalog,
        counter: &counter,
        platform: &platform,
        validator: &StructuralValidator,
    };
    let mut report = Report::new();
    let summary = run(&config(), &services, &mut report).await.unwrap();

    let row = &report.rows()[0];
    assert_eq!(row.record_status, RecordStatus::Failed);
    assert_eq!(row.call_number, None);
    assert!(row.errors.iter().any(|e| e.contains("exhausted")), "{:?}", row.errors);
    assert_eq!(summary.call_numbers_allocated, 0);
}
