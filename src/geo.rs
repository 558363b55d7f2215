//! Country resolution backed by a MaxMind GeoLite2 database.

use anyhow::{Context, Result};
use maxminddb::geoip2;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

#[cfg(test)]
use mockall::automock;

/// Resolves an IP to a country name
#[cfg_attr(test, automock)]
pub trait GeoLookup: Send + Sync {
    /// English country name, or `None` when unknown
    fn country(&self, ip: &str) -> Option<String>;
}

/// GeoLite2 Country / City reader
pub struct MaxMindGeo {
    reader: maxminddb::Reader<Vec<u8>>,
}

impl MaxMindGeo {
    pub fn open(path: &Path) -> Result<Self> {
        let reader = maxminddb::Reader::open_readfile(path)
            .with_context(|| format!("Failed to open GeoIP database {:?}", path))?;
        Ok(Self { reader })
    }
}

/// Resolve a database path, falling back to a file in the same directory
/// whose name differs only in ASCII case (`GeoLite2-country.mmdb` vs
/// MaxMind's `GeoLite2-Country.mmdb`).
pub fn locate_database(path: &Path) -> PathBuf {
    if path.exists() {
        return path.to_path_buf();
    }
    let Some(name) = path.file_name() else {
        return path.to_path_buf();
    };
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    std::fs::read_dir(dir)
        .into_iter()
        .flatten()
        .filter_map(|entry| entry.ok())
        .find(|entry| entry.file_name().eq_ignore_ascii_case(name))
        .map(|entry| entry.path())
        .unwrap_or_else(|| path.to_path_buf())
}

impl GeoLookup for MaxMindGeo {
    fn country(&self, ip: &str) -> Option<String> {
        let ip: IpAddr = ip.parse().ok()?;
        let record = self.reader.lookup::<geoip2::Country>(ip).ok()?;
        let country = record.country?;

        country
            .names
            .as_ref()
            .and_then(|names| names.get("en"))
            .map(|name| name.to_string())
            .or_else(|| country.iso_code.map(str::to_string))
    }
}
