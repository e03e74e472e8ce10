use serde::Deserialize;

/// Investor-owned utility. Only the name is used as a key into reference tables.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Utility {
    pub name: String,
    #[serde(default = "default_nameplate")]
    pub nameplate_multiplier: f64,
}

fn default_nameplate() -> f64 {
    1.0
}

impl Utility {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nameplate_multiplier: default_nameplate(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum ProviderKind {
    /// Direct access electric service provider.
    #[serde(rename = "da")]
    Direct,
    /// Community choice aggregator.
    #[serde(rename = "cca")]
    Cca,
}

/// Alternate generation provider bound to an agreement.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
pub struct Provider {
    pub name: String,
    pub kind: ProviderKind,
}

impl Provider {
    pub fn new(name: impl Into<String>, kind: ProviderKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// Cost responsibility surcharge type the provider's customers pay.
    pub fn surcharge_type(&self) -> &'static str {
        match self.kind {
            ProviderKind::Direct => "da",
            ProviderKind::Cca => "cca",
        }
    }
}
