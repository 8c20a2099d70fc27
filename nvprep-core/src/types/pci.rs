//! PCI address domain types.

use crate::error::{NvprepError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Separator used for PCI address lists supplied on the command line.
pub const CLI_PCI_ADDR_SEP: char = ',';

/// Separator used for PCI address lists handed to the bdev backend.
pub const BDEV_PCI_ADDR_SEP: char = ' ';

/// Regular expression to validate PCI address format: 0000:01:00.0
///
/// Domains wider than 16 bits show up for devices behind a VMD controller,
/// e.g. `10000:01:00.0`.
static PCI_ADDRESS_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-fA-F]{4,8}:[0-9a-fA-F]{2}:[0-9a-fA-F]{2}\.[0-7]$")
        .expect("Invalid PCI address regex")
});

/// Validate PCI address format.
pub fn is_valid_pci_address(address: &str) -> bool {
    PCI_ADDRESS_REGEX.is_match(address)
}

/// A validated PCI device address, normalized to lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PciAddress(String);

impl PciAddress {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for PciAddress {
    type Err = NvprepError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if !is_valid_pci_address(s) {
            return Err(NvprepError::InvalidPciAddress { address: s.to_string() });
        }
        Ok(Self(s.to_lowercase()))
    }
}

impl TryFrom<String> for PciAddress {
    type Error = NvprepError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<PciAddress> for String {
    fn from(addr: PciAddress) -> Self {
        addr.0
    }
}

impl fmt::Display for PciAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An ordered list of PCI addresses.
///
/// Renders space separated, which is the form the bdev backend expects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PciAddressList(Vec<PciAddress>);

impl PciAddressList {
    pub fn new(addrs: Vec<PciAddress>) -> Self {
        Self(addrs)
    }

    /// Parse a list of addresses separated by `sep`. Empty entries are skipped.
    pub fn parse_with_sep(input: &str, sep: char) -> Result<Self> {
        input
            .split(sep)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(PciAddress::from_str)
            .collect::<Result<Vec<_>>>()
            .map(Self)
    }

    /// Parse a comma separated list as given on the command line.
    ///
    /// Returns `None` for an empty or whitespace-only input.
    pub fn from_cli(input: &str) -> Result<Option<Self>> {
        let list = Self::parse_with_sep(input, CLI_PCI_ADDR_SEP)?;
        Ok((!list.is_empty()).then_some(list))
    }

    /// Parse individual address strings, e.g. from configuration.
    pub fn from_strings<S: AsRef<str>>(items: &[S]) -> Result<Self> {
        items.iter().map(|s| s.as_ref().parse()).collect::<Result<Vec<_>>>().map(Self)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, addr: &PciAddress) -> bool {
        self.0.contains(addr)
    }

    /// Membership test for a raw sysfs address string.
    pub fn contains_str(&self, addr: &str) -> bool {
        self.0.iter().any(|a| a.as_str().eq_ignore_ascii_case(addr))
    }

    pub fn iter(&self) -> impl Iterator<Item = &PciAddress> {
        self.0.iter()
    }

    pub fn extend(&mut self, other: PciAddressList) {
        self.0.extend(other.0);
    }
}

impl fmt::Display for PciAddressList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, addr) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "{}", BDEV_PCI_ADDR_SEP)?;
            }
            write!(f, "{}", addr)?;
        }
        Ok(())
    }
}

impl FromIterator<PciAddress> for PciAddressList {
    fn from_iter<I: IntoIterator<Item = PciAddress>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
