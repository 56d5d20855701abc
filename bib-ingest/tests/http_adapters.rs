mod common;

use bib_ingest::analytics::AnalyticsClient;
use bib_ingest::export::{ExportClient, ExportQuery};
use bib_ingest::platform::PlatformClient;
use bib_ingest::sru::SruClient;
use bib_ingest_core::contract::{
    BibRequest, CatalogLookup, CounterSource, HoldingRequest, ItemData, ItemRequest, LookupQuery,
    PageRequest, PageSource, Platform,
};
use bib_ingest_core::marc::{DataField, MarcRecord};
use chrono::NaiveDate;
use common::{serve, Stub};

fn export_client(stub: &Stub) -> ExportClient {
    let query = ExportQuery {
        base_url: format!("{}/export", stub.base_url),
        configuration: "researchoutputs".into(),
        types: "thesis-coar-types:c_db06,authority".into(),
        publisher: "EPFL".into(),
        window_start: NaiveDate::from_ymd_opt(2024, 5, 1),
        sort_field: "dc.date.accessioned".into(),
        sort_order: "DESC".into(),
        format: "xm".into(),
    };
    ExportClient::new(
        reqwest::Client::new(),
        query,
        format!("{}/fixed?of=xm", stub.base_url),
    )
}

#[tokio::test]
async fn export_client_requests_the_asked_page() {
    let stub = serve(|_, url, _| {
        if url.contains("spc.page=2") {
            (200, common::collection(&[("123", "A thesis")]))
        } else {
            (200, common::collection(&[]))
        }
    });
    let client = export_client(&stub);

    let records = client
        .fetch_page(&PageRequest::Paged { page: 2, size: 5 })
        .await
        .expect("page 2");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].identifier(), Some("123"));

    let seen = stub.requests();
    assert!(seen[0].url.starts_with("/export?"));
    assert!(seen[0].url.contains("spc.rpp=5"));
    assert!(seen[0].url.contains("of=xm"));
}

#[tokio::test]
async fn export_client_uses_the_fixed_url_and_reports_http_errors() {
    let stub = serve(|_, url, _| {
        if url.starts_with("/fixed") {
            (200, common::collection(&[("9", "Fixed")]))
        } else {
            (503, "busy".to_string())
        }
    });
    let client = export_client(&stub);

    let records = client.fetch_page(&PageRequest::Fixed).await.expect("fixed page");
    assert_eq!(records.len(), 1);

    assert!(client
        .fetch_page(&PageRequest::Paged { page: 1, size: 5 })
        .await
        .is_err());
}

#[tokio::test]
async fn analytics_client_sends_the_read_key() {
    let stub = serve(|_, _, _| (200, common::ANALYTICS_42.to_string()));
    let client = AnalyticsClient::new(
        reqwest::Client::new(),
        &stub.base_url,
        "/almaws/v1/analytics/reports?path=counter",
        "read-key".into(),
    );

    assert_eq!(client.fetch_last_issued().await.unwrap(), 42);
    let seen = stub.requests();
    assert!(seen[0].url.starts_with("/almaws/v1/analytics/reports"));
    assert_eq!(seen[0].authorization.as_deref(), Some("apikey read-key"));
}

#[tokio::test]
async fn sru_client_builds_a_search_retrieve_query() {
    let stub = serve(|_, _, _| (200, common::SRU_EMPTY.to_string()));
    let client = SruClient::new(reqwest::Client::new(), format!("{}/sru/NET", stub.base_url));
    let query = LookupQuery {
        source_id: "1".into(),
        title: "Predictive control".into(),
        author: "Doe, Jane".into(),
    };

    assert_eq!(client.lookup(&query).await.unwrap(), None);
    let url = &stub.requests()[0].url;
    assert!(url.starts_with("/sru/NET?"));
    assert!(url.contains("operation=searchRetrieve"));
    assert!(url.contains("version=1.2"));
    assert!(url.contains("maximumRecords=1"));
}

#[tokio::test]
async fn sru_client_fails_on_server_errors() {
    let stub = serve(|_, _, _| (500, "oops".to_string()));
    let client = SruClient::new(reqwest::Client::new(), format!("{}/sru/NET", stub.base_url));
    let query = LookupQuery {
        source_id: "1".into(),
        title: "T".into(),
        author: "A".into(),
    };

    let err = client.lookup(&query).await.unwrap_err();
    assert!(err.to_string().contains("HTTP error: 500"), "{err}");
}

fn bib_record() -> MarcRecord {
    let mut marc = MarcRecord::new("00000nam a2200000 c 4500");
    marc.add_control_field("001", "123");
    marc.add_field(DataField::new("245", '1', '0').with_subfield('a', "A thesis"));
    marc
}

#[tokio::test]
async fn platform_client_creates_bib_holding_and_item() {
    let stub = serve(|_, url, body| {
        if url.ends_with("/items") {
            // The platform drops the work order fields.
            let echoed = common::item_created(body, "2301")
                .replace("<work_order_at>AcqDept</work_order_at>", "");
            (200, echoed)
        } else if url.ends_with("/holdings") {
            (200, common::holding_created("2201"))
        } else {
            (200, common::bib_created("9901"))
        }
    });
    let client = PlatformClient::new(reqwest::Client::new(), &stub.base_url, "write-key".into());

    let bib = client
        .create_bib(&BibRequest { record: bib_record() })
        .await
        .unwrap();
    assert_eq!(bib.bib_id, "9901");

    let holding = client
        .create_holding(&HoldingRequest {
            bib_id: bib.bib_id.clone(),
            library: "lib".into(),
            location: "E02XA".into(),
            record: MarcRecord::new("00000nx  a2200061zn 4500"),
        })
        .await
        .unwrap();
    assert_eq!(holding.holding_id, "2201");

    let item = client
        .create_item(&ItemRequest {
            bib_id: bib.bib_id.clone(),
            holding_id: holding.holding_id.clone(),
            item: ItemData {
                base_status: "70".into(),
                physical_material_type: "THESIS".into(),
                policy: "70".into(),
                po_line: None,
                arrival_date: NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
                library: "lib".into(),
                location: "E02XA".into(),
                work_order_department: Some("AcqDept".into()),
            },
        })
        .await
        .unwrap();
    assert_eq!(item.item_id, "2301");
    assert_eq!(item.ignored_fields, vec!["work_order_at".to_string()]);

    let posts = stub.requests_to("POST", "/almaws/v1/bibs");
    assert_eq!(posts.len(), 3);
    assert!(posts[0].body.starts_with("<bib><record>"));
    assert!(posts[1].url.ends_with("/bibs/9901/holdings"));
    assert!(posts[2].url.ends_with("/bibs/9901/holdings/2201/items"));
    assert!(posts
        .iter()
        .all(|p| p.authorization.as_deref() == Some("apikey write-key")));
}

#[tokio::test]
async fn platform_errors_carry_the_status_and_message() {
    let stub = serve(|_, _, _| {
        (
            400,
            "<web_service_result><errorsExist>true</errorsExist><errorList><error><errorCode>402459</errorCode><errorMessage>Invalid location</errorMessage></error></errorList></web_service_result>"
                .to_string(),
        )
    });
    let client = PlatformClient::new(reqwest::Client::new(), &stub.base_url, "k".into());

    let err = client
        .create_bib(&BibRequest { record: bib_record() })
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "HTTP 400: Invalid location");
}
