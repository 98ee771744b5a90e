//! Shared helpers for integration tests: an in-process fake debugger and a
//! small packaged document builder.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Write;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use base64::Engine;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const FRAME_URL: &str =
    "httpsr2://id_book/xthoriumhttps/ip0.0.0.0/p/EPUB/ch1.xhtml";
pub const FRAME_BASE: &str = "httpsr2://id_book/xthoriumhttps/ip0.0.0.0/p/";

/// A command the fake debugger received.
#[derive(Debug, Clone)]
pub struct Received {
    pub connection: usize,
    pub id: u64,
    pub method: String,
}

/// Answers the handful of commands the extractor sends.
///
/// Every command is preceded by an unsolicited event and a response to an id
/// nobody asked for, so clients must correlate by id.
pub struct FakeDebugger {
    pub addr: SocketAddr,
    received: Arc<Mutex<Vec<Received>>>,
}

impl FakeDebugger {
    pub async fn start(frame_url: &str, resources: HashMap<String, Vec<u8>>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let received = Arc::new(Mutex::new(Vec::new()));
        let resources = Arc::new(resources);
        let frame_url = frame_url.to_string();

        let log = Arc::clone(&received);
        tokio::spawn(async move {
            let mut connection = 0usize;
            while let Ok((stream, _)) = listener.accept().await {
                connection += 1;
                let log = Arc::clone(&log);
                let resources = Arc::clone(&resources);
                let frame_url = frame_url.clone();
                tokio::spawn(async move {
                    let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
                        return;
                    };
                    let (mut tx, mut rx) = ws.split();
                    while let Some(Ok(msg)) = rx.next().await {
                        let Message::Text(text) = msg else {
                            continue;
                        };
                        let cmd: Value = serde_json::from_str(&text).unwrap();
                        let id = cmd["id"].as_u64().unwrap();
                        let method = cmd["method"].as_str().unwrap().to_string();
                        log.lock().unwrap().push(Received {
                            connection,
                            id,
                            method: method.clone(),
                        });

                        let noise = [
                            json!({"method": "Runtime.consoleAPICalled", "params": {"type": "log"}}),
                            json!({"id": id + 1000, "result": {}}),
                        ];
                        for frame in noise {
                            if tx.send(Message::Text(frame.to_string())).await.is_err() {
                                return;
                            }
                        }
                        let reply = respond(id, &method, &cmd["params"], &frame_url, &resources);
                        if tx.send(Message::Text(reply.to_string())).await.is_err() {
                            return;
                        }
                    }
                });
            }
        });

        Self { addr, received }
    }

    pub fn channel_url(&self) -> String {
        format!("ws://{}/devtools/page/DOC", self.addr)
    }

    pub fn received(&self) -> Vec<Received> {
        self.received.lock().unwrap().clone()
    }

    pub fn connections(&self) -> usize {
        self.received()
            .iter()
            .map(|r| r.connection)
            .max()
            .unwrap_or(0)
    }
}

fn respond(
    id: u64,
    method: &str,
    params: &Value,
    frame_url: &str,
    resources: &HashMap<String, Vec<u8>>,
) -> Value {
    match method {
        "Runtime.enable" | "Page.enable" => json!({"id": id, "result": {}}),
        "Page.getFrameTree" => json!({
            "id": id,
            "result": {
                "frameTree": {
                    "frame": {"id": "root", "url": "file:///app/index_reader.html"},
                    "childFrames": [
                        {"frame": {"id": "webview", "url": frame_url}}
                    ]
                }
            }
        }),
        "Runtime.evaluate" => {
            let expression = params["expression"].as_str().unwrap_or_default();
            let url = fetched_url(expression);
            if url.contains("remote-error") {
                return json!({"id": id, "error": {"code": -32000, "message": "Target closed"}});
            }
            if url.contains("throws") {
                return json!({
                    "id": id,
                    "result": {
                        "result": {"type": "object"},
                        "exceptionDetails": {"text": "Uncaught", "lineNumber": 1}
                    }
                });
            }
            let value = match resources.get(&url) {
                Some(bytes) if expression.contains("btoa") => json!({
                    "success": true,
                    "base64": base64::engine::general_purpose::STANDARD.encode(bytes),
                }),
                Some(bytes) => json!({
                    "success": true,
                    "content": String::from_utf8_lossy(bytes),
                }),
                None => json!({"error": "Fetch failed: 404 Not Found"}),
            };
            json!({"id": id, "result": {"result": {"type": "object", "value": value}}})
        }
        other => json!({
            "id": id,
            "error": {"code": -32601, "message": format!("'{other}' wasn't found")}
        }),
    }
}

/// The URL literal passed to `fetch(` inside an evaluated expression.
pub fn fetched_url(expression: &str) -> String {
    let Some(start) = expression.find("fetch(") else {
        return String::new();
    };
    let rest = &expression[start + "fetch(".len()..];
    serde_json::Deserializer::from_str(rest)
        .into_iter::<String>()
        .next()
        .and_then(Result::ok)
        .unwrap_or_default()
}

pub const CONTAINER_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="EPUB/package.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

pub const PACKAGE_OPF: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0">
  <metadata/>
  <manifest>
    <item id="nav" href="nav.xhtml" media-type="application/xhtml+xml" properties="nav"/>
    <item id="ch1" href="xhtml/ch1.xhtml" media-type="application/xhtml+xml"/>
    <item id="ch2" href="xhtml/ch2.xhtml" media-type="application/xhtml+xml"/>
    <item id="css" href="css/style.css" media-type="text/css"/>
    <item id="cover" href="images/cover.png" media-type="image/png"/>
    <item id="font" href="fonts/book.otf" media-type="font/otf"/>
  </manifest>
</package>"#;

pub const CHAPTER_ONE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<html xmlns="http://www.w3.org/1999/xhtml" data-readium-root="1">
<head>
<script src="/readium/injected.js"></script>
<title>One</title>
<link rel="stylesheet" href="/readium-css/ReadiumCSS-after.css"/>
<link rel="stylesheet" href="../css/style.css"/>
<meta charset="utf-8"/>
</head>
<body><p>First chapter</p></body>
</html>"#;

pub const COVER_PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0, 0xff];

/// Resources as the host would serve them under the frame base.
pub fn served_resources() -> HashMap<String, Vec<u8>> {
    let base = format!("{FRAME_BASE}EPUB/");
    HashMap::from([
        (format!("{base}xhtml/ch1.xhtml"), CHAPTER_ONE.as_bytes().to_vec()),
        (format!("{base}css/style.css"), b"p { margin: 0 }".to_vec()),
        (format!("{base}images/cover.png"), COVER_PNG.to_vec()),
        (format!("{base}nav.xhtml"), b"<html>served nav</html>".to_vec()),
        (format!("{base}fonts/book.otf"), b"served font".to_vec()),
    ])
}

/// Write a packaged document with encrypted placeholders to `dir`.
pub fn write_source_epub(dir: &Path) -> PathBuf {
    let path = dir.join("book.epub");
    let mut zip = ZipWriter::new(std::fs::File::create(&path).unwrap());
    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let entries: [(&str, &[u8], SimpleFileOptions); 10] = [
        ("mimetype", b"application/epub+zip", stored),
        ("META-INF/container.xml", CONTAINER_XML.as_bytes(), deflated),
        ("META-INF/encryption.xml", b"<encryption/>", deflated),
        ("META-INF/license.lcpl", b"{\"id\":\"lic\"}", deflated),
        ("EPUB/package.opf", PACKAGE_OPF.as_bytes(), deflated),
        ("EPUB/nav.xhtml", b"<html>archived nav</html>", deflated),
        ("EPUB/xhtml/ch1.xhtml", b"\x00encrypted ch1", deflated),
        ("EPUB/xhtml/ch2.xhtml", b"\x00encrypted ch2", deflated),
        ("EPUB/css/style.css", b"\x00encrypted css", deflated),
        ("EPUB/images/cover.png", b"\x00encrypted png", stored),
    ];
    for (name, bytes, options) in entries {
        zip.start_file(name, options).unwrap();
        zip.write_all(bytes).unwrap();
    }
    zip.start_file("EPUB/fonts/book.otf", deflated).unwrap();
    zip.write_all(b"\x00encrypted font").unwrap();
    zip.finish().unwrap();
    path
}

/// Every entry of the archive at `path` as `(name, compression, bytes)`, in order.
pub fn read_entries(path: &Path) -> Vec<(String, CompressionMethod, Vec<u8>)> {
    use std::io::Read;

    let mut archive = zip::ZipArchive::new(std::fs::File::open(path).unwrap()).unwrap();
    (0..archive.len())
        .map(|i| {
            let mut entry = archive.by_index(i).unwrap();
            let mut bytes = Vec::new();
            entry.read_to_end(&mut bytes).unwrap();
            (entry.name().to_string(), entry.compression(), bytes)
        })
        .collect()
}
