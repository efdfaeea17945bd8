//! Transport contract and request URL construction.

use std::time::Duration;

use crate::config::EndpointConfig;
use crate::decode::TextureFormat;
use crate::error::TransportError;
use crate::octree::NodePath;

/// Blocking byte fetch, called from worker threads only.
pub trait Transport: Send + Sync {
  /// Fetch `url`. `timeout` bounds this single attempt.
  fn fetch(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, TransportError>;
}

/// Expands the endpoint templates into request URLs.
#[derive(Clone, Debug, PartialEq)]
pub struct UrlBuilder {
  planetoid: String,
  bulk: String,
  node_data: String,
  node_data_imagery: String,
}

impl UrlBuilder {
  pub fn new(endpoint: &EndpointConfig) -> Self {
    let base = |template: &str| template.replace("{base}", &endpoint.base_url);
    Self {
      planetoid: base(&endpoint.planetoid),
      bulk: base(&endpoint.bulk),
      node_data: base(&endpoint.node_data),
      node_data_imagery: base(&endpoint.node_data_imagery),
    }
  }

  pub fn planetoid(&self) -> String {
    self.planetoid.clone()
  }

  pub fn bulk(&self, head: &NodePath, epoch: u32) -> String {
    self
      .bulk
      .replace("{path}", &head.to_string())
      .replace("{epoch}", &epoch.to_string())
  }

  /// Node data URL; the imagery template is used when `imagery_epoch` is set.
  pub fn node_data(&self, path: &NodePath, epoch: u32, format: TextureFormat, imagery_epoch: Option<u32>) -> String {
    let template = match imagery_epoch {
      Some(_) => &self.node_data_imagery,
      None => &self.node_data,
    };
    let mut url = template
      .replace("{path}", &path.to_string())
      .replace("{epoch}", &epoch.to_string())
      .replace("{texture_format}", &format.wire_value().to_string());
    if let Some(imagery) = imagery_epoch {
      url = url.replace("{imagery_epoch}", &imagery.to_string());
    }
    url
  }
}
