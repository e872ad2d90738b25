//! WMTS GetCapabilities client for discovering published layers.

use crate::config::LayerConfig;
use bench_common::{BenchError, BenchResult, LayerId};
use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::{debug, info};

/// A layer advertised in the capabilities document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityLayer {
    pub identifier: String,
    pub title: String,
}

/// Fetch and parse the layers offered by a WMTS endpoint.
pub async fn fetch_layers(client: &reqwest::Client, capabilities_url: &str) -> BenchResult<Vec<CapabilityLayer>> {
    debug!(url = %capabilities_url, "Fetching WMTS capabilities");
    let response = client
        .get(capabilities_url)
        .send()
        .await
        .map_err(|e| BenchError::Capabilities(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(BenchError::Capabilities(format!(
            "{} returned HTTP {}",
            capabilities_url, status
        )));
    }

    let xml = response
        .text()
        .await
        .map_err(|e| BenchError::Capabilities(e.to_string()))?;
    let layers = parse_layers(&xml)?;
    info!(count = layers.len(), "Discovered WMTS layers");
    Ok(layers)
}

/// Parse `Contents/Layer` identifiers and titles.
///
/// Only direct children of a `Layer` count; the `Style` and
/// `TileMatrixSet` blocks carry their own identifiers and titles.
pub fn parse_layers(xml: &str) -> BenchResult<Vec<CapabilityLayer>> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut layers = Vec::new();
    let mut identifier = String::new();
    let mut title = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = e.local_name().as_ref().to_vec();
                if name == b"Layer" {
                    identifier.clear();
                    title.clear();
                }
                path.push(name);
            }
            Ok(Event::Text(t)) => {
                let in_layer = path.len() >= 2 && path[path.len() - 2] == b"Layer";
                if in_layer {
                    let text = t
                        .unescape()
                        .map_err(|e| BenchError::Capabilities(e.to_string()))?;
                    match path.last().map(|n| n.as_slice()) {
                        Some(b"Identifier") => identifier.push_str(&text),
                        Some(b"Title") => title.push_str(&text),
                        _ => {}
                    }
                }
            }
            Ok(Event::End(_)) => {
                if path.pop().as_deref() == Some(b"Layer".as_slice()) && !identifier.is_empty() {
                    layers.push(CapabilityLayer {
                        identifier: identifier.clone(),
                        title: title.clone(),
                    });
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(BenchError::Capabilities(format!(
                    "XML parsing error at position {}: {:?}",
                    reader.buffer_position(),
                    e
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(layers)
}

/// Fill empty layer descriptions from discovered titles. Returns how many
/// were filled.
pub fn fill_descriptions(layers: &mut [LayerConfig], discovered: &[CapabilityLayer]) -> usize {
    let mut filled = 0;
    for layer in layers.iter_mut().filter(|l| l.description.is_empty()) {
        let (_, name) = LayerId::parse(&layer.name);
        let titled = || discovered.iter().filter(|d| !d.title.is_empty());
        // an exact identifier wins over a match on the unqualified name
        let found = titled()
            .find(|d| d.identifier == layer.name)
            .or_else(|| titled().find(|d| LayerId::parse(&d.identifier).1 == name));
        if let Some(found) = found {
            layer.description = found.title.clone();
            filled += 1;
        }
    }
    filled
}
