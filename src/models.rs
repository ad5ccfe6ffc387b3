// Core data structures for the wilayah region tree

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::utils::error::CodeError;
use crate::utils::normalize_text;

/// Village / kelurahan (leaf)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Village {
    pub id: String, // 3 digits, e.g. "001"
    pub nama: String,
}

/// District / kecamatan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct District {
    pub id: String, // 3 digits, e.g. "010"
    pub nama: String,
    #[serde(default)]
    pub des: Vec<Village>,
}

/// Regency / kabupaten or kota
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Regency {
    pub id: String, // 2 digits, e.g. "02"
    pub nama: String,
    #[serde(default)]
    pub kec: Vec<District>,
}

/// Province / provinsi
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Province {
    pub id: String, // 2 digits, e.g. "73"
    pub nama: String,
    #[serde(default)]
    pub kab: Vec<Regency>,
}

/// Root of the region tree; provinces in arrival order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionData {
    #[serde(default)]
    pub pro: Vec<Province>,
}

impl Village {
    pub fn new(id: impl Into<String>, nama: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            nama: nama.into(),
        }
    }
}

impl District {
    pub fn new(id: impl Into<String>, nama: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            nama: nama.into(),
            des: Vec::new(),
        }
    }

    pub fn find_village(&self, id: &str) -> Option<&Village> {
        self.des.iter().find(|d| d.id == id)
    }
}

impl Regency {
    pub fn new(id: impl Into<String>, nama: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            nama: nama.into(),
            kec: Vec::new(),
        }
    }

    pub fn find_district(&self, id: &str) -> Option<&District> {
        self.kec.iter().find(|k| k.id == id)
    }
}

impl Province {
    pub fn new(id: impl Into<String>, nama: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            nama: nama.into(),
            kab: Vec::new(),
        }
    }

    pub fn find_regency(&self, id: &str) -> Option<&Regency> {
        self.kab.iter().find(|k| k.id == id)
    }
}

impl RegionData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.pro.is_empty()
    }

    pub fn find_province(&self, id: &str) -> Option<&Province> {
        self.pro.iter().find(|p| p.id == id)
    }

    /// Codes of every province already present
    pub fn province_ids(&self) -> std::collections::HashSet<String> {
        self.pro.iter().map(|p| p.id.clone()).collect()
    }

    /// Count nodes at every level
    pub fn counts(&self) -> RegionCounts {
        let mut counts = RegionCounts {
            provinces: self.pro.len(),
            ..Default::default()
        };

        for prov in &self.pro {
            counts.regencies += prov.kab.len();
            for kab in &prov.kab {
                counts.districts += kab.kec.len();
                for kec in &kab.kec {
                    counts.villages += kec.des.len();
                }
            }
        }

        counts
    }

    /// Full 10-digit codes of every village in the tree
    pub fn village_codes(&self) -> impl Iterator<Item = String> + '_ {
        self.pro.iter().flat_map(|p| {
            p.kab.iter().flat_map(move |k| {
                k.kec.iter().flat_map(move |c| {
                    c.des
                        .iter()
                        .map(move |d| format!("{}{}{}{}", p.id, k.id, c.id, d.id))
                })
            })
        })
    }

    /// Re-run name normalisation over the whole tree
    pub fn normalize_names(&mut self) {
        for prov in &mut self.pro {
            prov.nama = normalize_text(&prov.nama);
            for kab in &mut prov.kab {
                kab.nama = normalize_text(&kab.nama);
                for kec in &mut kab.kec {
                    kec.nama = normalize_text(&kec.nama);
                    for des in &mut kec.des {
                        des.nama = normalize_text(&des.nama);
                    }
                }
            }
        }
    }
}

/// Node counts per level
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionCounts {
    pub provinces: usize,
    #[serde(rename = "kabupaten")]
    pub regencies: usize,
    #[serde(rename = "kecamatan")]
    pub districts: usize,
    #[serde(rename = "desa")]
    pub villages: usize,
}

/// A composite region code split into its level segments
///
/// Widths are 2 (province), 4 (regency), 7 (district) and 10 (village).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegionCode {
    Province {
        pro: String,
    },
    Regency {
        pro: String,
        kab: String,
    },
    District {
        pro: String,
        kab: String,
        kec: String,
    },
    Village {
        pro: String,
        kab: String,
        kec: String,
        des: String,
    },
}

impl RegionCode {
    pub fn parse(code: &str) -> Result<Self, CodeError> {
        if !code.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CodeError::NotNumeric(code.to_string()));
        }

        let seg = |from: usize, to: usize| code[from..to].to_string();

        match code.len() {
            2 => Ok(Self::Province { pro: seg(0, 2) }),
            4 => Ok(Self::Regency {
                pro: seg(0, 2),
                kab: seg(2, 4),
            }),
            7 => Ok(Self::District {
                pro: seg(0, 2),
                kab: seg(2, 4),
                kec: seg(4, 7),
            }),
            10 => Ok(Self::Village {
                pro: seg(0, 2),
                kab: seg(2, 4),
                kec: seg(4, 7),
                des: seg(7, 10),
            }),
            len => Err(CodeError::InvalidLength(len)),
        }
    }

    /// Level name as used by the lookup API
    pub fn level(&self) -> &'static str {
        match self {
            Self::Province { .. } => "provinsi",
            Self::Regency { .. } => "kabupaten",
            Self::District { .. } => "kecamatan",
            Self::Village { .. } => "desa",
        }
    }

    pub fn full_code(&self) -> String {
        match self {
            Self::Province { pro } => pro.clone(),
            Self::Regency { pro, kab } => format!("{pro}{kab}"),
            Self::District { pro, kab, kec } => format!("{pro}{kab}{kec}"),
            Self::Village { pro, kab, kec, des } => format!("{pro}{kab}{kec}{des}"),
        }
    }
}

impl fmt::Display for RegionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.full_code())
    }
}

impl std::str::FromStr for RegionCode {
    type Err = CodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
