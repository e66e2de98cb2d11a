//! Static translation settings and parent lookups
//!
//! Everything the translator needs beyond the record itself is passed in
//! explicitly: the immutable [`TranslationConfig`] and the resolved
//! [`ParentContext`].

use geocore_common::{HarvestError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use super::types::{Bilingual, Contact, OnlineResources, OptionalBilingual};
use crate::stac::Collection;

/// Disclaimer appended to every English description. The `\n` sequences are
/// literal backslashes, rendered as line breaks by the catalogue.
pub const DISCLAIMER_EN: &str = "\\n\\n**This third party metadata element follows the Spatio Temporal Asset Catalog (STAC) specification.**";

pub const DISCLAIMER_FR: &str = "\\n\\n**Cet élément de métadonnées tiers suit la spécification Spatio Temporal Asset Catalog (STAC).**";

const USE_LIMITS_EN: &str = "RADARSAT Constellation Mission (RCM) - Public User License Agreement https://www.asc-csa.gc.ca/eng/satellites/radarsat/access-to-data/public-user-license-agreement.asp";

const USE_LIMITS_FR: &str = "Mission de la Constellation RADARSAT (MCR) - Contrat de licence d'utilisateur public https://www.asc-csa.gc.ca/fra/satellites/radarsat/acces-aux-donnees/contrat-licence-utilisateur-public.asp";

const COLLECTION_DESCRIPTION_EN: &str = "The RADARSAT Constellation Mission (RCM) is Canada's third generation of Earth observation satellites. Launched on June 12, 2019, the three identical satellites work together to bring solutions to key challenges for Canadians. As part of ongoing Open Government efforts, NRCan has developed a CEOS analysis ready data (ARD) processing capability for RCM and is processing the Canada-wide, 30M Compact-Polarization standard coverage, every 12 days. Previously, users were stuck ordering, downloading and processing RCM images (level 1) on their own, often with expensive software. This new dataset aims to remove these burdens with a new STAC catalog for discover and direct download from S3.";

const COLLECTION_DESCRIPTION_FR: &str = "La mission de la Constellation RADARSAT (MCR) est la troisième génération de satellites d'observation de la Terre du Canada. Lancés le 12 juin 2019, les trois satellites identiques travaillent ensemble pour apporter des solutions aux principaux défis des Canadiens. Dans le cadre des efforts continus pour un gouvernement ouvert, RNCan a développé une capacité de traitement des données prêtes à l'analyse (DPA) du CEOS pour le MCR et traite la couverture standard de polarisation compacte de 30 M à l'échelle du Canada, tous les 12 jours. Auparavant, les utilisateurs étaient obligés de commander, de télécharger et de traiter eux-mêmes les images RCM (niveau 1), souvent à l'aide de logiciels coûteux. Ce nouvel ensemble de données vise à supprimer ces fardeaux avec un nouveau catalogue STAC à découvrir et à télécharger directement depuis S3.";

const COLLECTION_KEYWORDS_FR: &str =
    "MCR, radar, observation de la Terre, ESA, La mission de la Constellation RADARSAT";

/// Bilingual blocks shared by every record of a harvest. Defaults describe
/// the RCM analysis-ready collection; a JSON file may override any field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticMetadata {
    pub status: String,
    pub maintenance: String,
    pub use_limits: Bilingual,
    pub spatial_representation: String,
    pub type_data: String,
    pub topic_category: String,
    pub disclaimer: Bilingual,
    /// The source API is English-only, so collection and item descriptions
    /// come from here rather than from the documents
    pub collection_description: Bilingual,
    pub collection_keywords_fr: String,
    pub contact: Vec<Contact>,
}

impl Default for StaticMetadata {
    fn default() -> Self {
        Self {
            status: "active".to_string(),
            maintenance: "active".to_string(),
            use_limits: Bilingual::new(USE_LIMITS_EN, USE_LIMITS_FR),
            spatial_representation: "grid; grille".to_string(),
            type_data: "Synthetic Aperature Radar; Radar à synthèse d'ouverture".to_string(),
            topic_category: "EarthObservation;SyntheticAperatureRadar".to_string(),
            disclaimer: Bilingual::new(DISCLAIMER_EN, DISCLAIMER_FR),
            collection_description: Bilingual::new(
                COLLECTION_DESCRIPTION_EN,
                COLLECTION_DESCRIPTION_FR,
            ),
            collection_keywords_fr: COLLECTION_KEYWORDS_FR.to_string(),
            contact: vec![eodms_contact()],
        }
    }
}

fn eodms_contact() -> Contact {
    Contact {
        organisation: OptionalBilingual::pair(
            "Government of Canada;Natural Resources Canada;Strategic Policy and Innovation Sector",
            "Gouvernement du Canada;Ressources naturelles Canada;Secteur de la politique stratégique et de l’innovation",
        ),
        email: OptionalBilingual::same("eodms-sgdot@nrcan-rncan.gc.ca"),
        individual: None,
        position: OptionalBilingual::default(),
        telephone: OptionalBilingual::default(),
        address: OptionalBilingual::same("580 Booth St"),
        city: Some("Ottawa".to_string()),
        pt: OptionalBilingual::same("Ontario"),
        postalcode: Some("K1A 0E4".to_string()),
        country: OptionalBilingual::same("Canada"),
        online_resources: OnlineResources::default(),
        hours_of_service: None,
        role: None,
    }
}

impl StaticMetadata {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read(path).map_err(|e| {
            HarvestError::Config(format!(
                "failed to read translation config {}: {}",
                path.display(),
                e
            ))
        })?;
        serde_json::from_slice(&raw).map_err(|e| {
            HarvestError::Config(format!(
                "invalid translation config {}: {}",
                path.display(),
                e
            ))
        })
    }
}

/// Immutable input of every translation
#[derive(Debug, Clone, PartialEq)]
pub struct TranslationConfig {
    /// Short source tag used in identifiers and keys, e.g. `eodms`
    pub source: String,
    pub source_system_name: String,
    pub root_name: Bilingual,
    /// Collection being harvested, reported as `eoCollection`
    pub eo_collection: String,
    pub metadata: StaticMetadata,
}

impl TranslationConfig {
    pub fn new(
        source: impl Into<String>,
        source_system_name: impl Into<String>,
        root_name: &str,
        eo_collection: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            source_system_name: source_system_name.into(),
            root_name: Bilingual::split_pair(root_name),
            eo_collection: eo_collection.into(),
            metadata: StaticMetadata::default(),
        }
    }

    pub fn with_metadata(mut self, metadata: StaticMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Collection fields that items inherit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionContext {
    pub id: String,
    pub title: Bilingual,
    pub keywords: Bilingual,
}

impl CollectionContext {
    pub fn from_collection(collection: &Collection, config: &TranslationConfig) -> Self {
        Self {
            id: collection.id.clone(),
            title: Bilingual::same(collection.display_title()),
            keywords: Bilingual::new(
                collection.keywords.join(", "),
                config.metadata.collection_keywords_fr.clone(),
            ),
        }
    }

    /// Stand-in for an item whose collection was not listed by the API
    pub fn unlisted(collection_id: &str) -> Self {
        Self {
            id: collection_id.to_string(),
            title: Bilingual::same(collection_id),
            keywords: Bilingual::same(""),
        }
    }
}

/// Resolved parents: the root catalog id and the harvested collections
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParentContext {
    root_id: String,
    collections: BTreeMap<String, CollectionContext>,
}

impl ParentContext {
    /// `catalog_id` is normalized: spaces become hyphens
    pub fn new(catalog_id: &str) -> Self {
        Self {
            root_id: normalize_root_id(catalog_id),
            collections: BTreeMap::new(),
        }
    }

    pub fn with_collection(mut self, context: CollectionContext) -> Self {
        self.insert(context);
        self
    }

    pub fn insert(&mut self, context: CollectionContext) {
        self.collections.insert(context.id.clone(), context);
    }

    pub fn root_id(&self) -> &str {
        &self.root_id
    }

    pub fn collection(&self, id: &str) -> Option<&CollectionContext> {
        self.collections.get(id)
    }

    pub fn collection_count(&self) -> usize {
        self.collections.len()
    }
}

pub fn normalize_root_id(catalog_id: &str) -> String {
    catalog_id.replace(' ', "-")
}
