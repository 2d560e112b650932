//! Catalog episode ids (`7x01`) to the device's wire format (`S07E01`).

use regex::Regex;
use std::sync::LazyLock;

use crate::error::{RemoteError, Result};

static CATALOG_EPISODE_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-9]+)\s*[xX]\s*([0-9]+)$").expect("episode id pattern is valid")
});

/// Translate a catalog id such as `"34x14"` into `"S34E14"`.
///
/// Returns `None` when the input is not `<season>x<episode>`. Numbers keep
/// every significant digit and are zero-padded to at least two.
pub fn to_wire_episode_id(catalog_id: &str) -> Option<String> {
    let captures = CATALOG_EPISODE_ID.captures(catalog_id)?;
    let season = pad_number(&captures[1]);
    let episode = pad_number(&captures[2]);

    Some(format!("S{}E{}", season, episode))
}

/// Same as [`to_wire_episode_id`], failing with [`RemoteError::InvalidEpisodeId`].
pub fn translate_episode_id(catalog_id: &str) -> Result<String> {
    to_wire_episode_id(catalog_id)
        .ok_or_else(|| RemoteError::InvalidEpisodeId(catalog_id.to_string()))
}

fn pad_number(digits: &str) -> String {
    let significant = digits.trim_start_matches('0');
    format!("{:0>2}", significant)
}
