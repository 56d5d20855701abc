//! Local HTTP stub standing in for the repository, the union catalog and the
//! platform API.
#![allow(dead_code)]

use std::io::Read;
use std::sync::{Arc, Mutex};
use std::thread;

use tiny_http::{Header, Response, Server};

#[derive(Debug, Clone)]
pub struct Seen {
    pub method: String,
    pub url: String,
    pub authorization: Option<String>,
    pub body: String,
}

pub struct Stub {
    pub base_url: String,
    pub seen: Arc<Mutex<Vec<Seen>>>,
}

impl Stub {
    pub fn requests(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }

    pub fn requests_to(&self, method: &str, path_prefix: &str) -> Vec<Seen> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && r.url.starts_with(path_prefix))
            .collect()
    }
}

/// Serve every request with `route(method, url, body) -> (status, body)`.
pub fn serve<F>(route: F) -> Stub
where
    F: Fn(&str, &str, &str) -> (u16, String) + Send + 'static,
{
    let server = Server::http("127.0.0.1:0").expect("bind stub server");
    let addr = server.server_addr().to_ip().expect("ip listener");
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();

    thread::spawn(move || {
        for mut request in server.incoming_requests() {
            let mut body = String::new();
            let _ = request.as_reader().read_to_string(&mut body);
            let method = request.method().to_string();
            let url = request.url().to_string();
            let authorization = request
                .headers()
                .iter()
                .find(|h| h.field.equiv("Authorization"))
                .map(|h| h.value.to_string());
            log.lock().unwrap().push(Seen {
                method: method.clone(),
                url: url.clone(),
                authorization,
                body: body.clone(),
            });

            let (status, payload) = route(&method, &url, &body);
            let header = Header::from_bytes("Content-Type", "application/xml").unwrap();
            let response = Response::from_string(payload)
                .with_status_code(status)
                .with_header(header);
            let _ = request.respond(response);
        }
    });

    Stub {
        base_url: format!("http://{addr}"),
        seen,
    }
}

pub fn collection(records: &[(&str, &str)]) -> String {
    let mut xml = String::from(r#"<?xml version="1.0" encoding="UTF-8"?><collection xmlns="http://www.loc.gov/MARC21/slim">"#);
    for (id, title) in records {
        xml.push_str(&format!(
            r#"<record><leader>00000nam a2200000 c 4500</leader><controlfield tag="001">{id}</controlfield><datafield tag="245" ind1="1" ind2="0"><subfield code="a">{title}</subfield></datafield><datafield tag="700" ind1="1" ind2=" "><subfield code="a">Doe, Jane</subfield></datafield><datafield tag="260" ind1=" " ind2=" "><subfield code="a">Lausanne</subfield><subfield code="b">EPFL</subfield><subfield code="c">2024</subfield></datafield></record>"#
        ));
    }
    xml.push_str("</collection>");
    xml
}

pub const ANALYTICS_42: &str = r#"<report><QueryResult><ResultXml><rowset xmlns="urn:schemas-microsoft-com:xml-analysis:rowset"><Row><Column0>0</Column0><Column3>42</Column3></Row></rowset></ResultXml></QueryResult></report>"#;

pub const SRU_EMPTY: &str = r#"<searchRetrieveResponse xmlns="http://www.loc.gov/zing/srw/"><version>1.2</version><numberOfRecords>0</numberOfRecords></searchRetrieveResponse>"#;

pub fn bib_created(mms_id: &str) -> String {
    format!("<bib><mms_id>{mms_id}</mms_id><record_format>marc21</record_format></bib>")
}

pub fn holding_created(holding_id: &str) -> String {
    format!("<holding><holding_id>{holding_id}</holding_id></holding>")
}

/// Echo the request's `item_data` back with a `pid`.
pub fn item_created(request_body: &str, pid: &str) -> String {
    let start = request_body.find("<item_data>").map(|i| i + "<item_data>".len());
    let end = request_body.find("</item_data>");
    let inner = match (start, end) {
        (Some(s), Some(e)) if s <= e => &request_body[s..e],
        _ => "",
    };
    format!("<item><item_data><pid>{pid}</pid>{inner}</item_data></item>")
}
