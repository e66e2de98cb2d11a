//! Links and assets as GeoCore options

use indexmap::IndexMap;

use super::types::{Bilingual, GeoCoreOption};
use crate::stac::{Asset, Link};

const UNKNOWN_PROTOCOL: &str = "Unknown";
const DEFAULT_ASSET_TITLE: &str = "Unknown/Inconnu";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Root,
    Collection,
    Item,
}

/// What a link's display name may refer to
#[derive(Debug, Clone, Copy)]
pub struct LinkNaming<'a> {
    pub kind: RecordKind,
    /// Id of the record owning the links
    pub id: &'a str,
    pub root_name: &'a Bilingual,
    /// Title of the owning collection, used for an item's `parent` link
    pub parent_title: Option<&'a Bilingual>,
}

fn description_for(media_type: Option<&str>) -> Bilingual {
    let media_type = media_type.unwrap_or_default().replace(';', ",");
    Bilingual::new(
        format!("unknown;{};eng", media_type),
        format!("unknown;{};fra", media_type),
    )
}

fn non_empty(text: Option<&str>) -> Option<&str> {
    text.filter(|t| !t.is_empty())
}

/// Display name of a link, `None` for relations that are not exposed
pub fn link_name(link: &Link, naming: &LinkNaming<'_>) -> Option<Bilingual> {
    let root = naming.root_name;
    let name = match link.rel.as_str() {
        "collection" | "derived_from" => return None,
        "self" if naming.kind == RecordKind::Root => {
            Bilingual::new(format!("Root - {}", root.en), format!("Racine - {}", root.fr))
        },
        "self" => Bilingual::new(format!("Self - {}", naming.id), format!("Soi - {}", naming.id)),
        "root" => Bilingual::new(format!("Root - {}", root.en), format!("Racine - {}", root.fr)),
        "data" => Bilingual::new(
            format!("Collection - {}", root.en),
            format!("Collecte - {}", root.fr),
        ),
        "parent" => {
            let parent = naming.parent_title.filter(|_| naming.kind == RecordKind::Item);
            Bilingual::new(
                match parent.map(|t| t.en.as_str()).filter(|t| !t.is_empty()) {
                    Some(title) => format!("Parent - {}", title),
                    None => "Parent links".to_string(),
                },
                match parent.map(|t| t.fr.as_str()).filter(|t| !t.is_empty()) {
                    Some(title) => format!("Parente - {}", title),
                    None => "Parente liens".to_string(),
                },
            )
        },
        "items" => Bilingual::new("Items API", "Éléments la API"),
        _ => match non_empty(link.title.as_deref()) {
            Some(title) => Bilingual::same(title),
            None => Bilingual::new("Unknown", "Inconnue"),
        },
    };
    Some(name)
}

pub fn link_options(links: &[Link], naming: &LinkNaming<'_>) -> Vec<GeoCoreOption> {
    links
        .iter()
        .filter_map(|link| {
            link_name(link, naming).map(|name| GeoCoreOption {
                url: link.href.clone(),
                protocol: UNKNOWN_PROTOCOL.to_string(),
                name,
                description: description_for(link.media_type.as_deref()),
            })
        })
        .collect()
}

/// One option per asset, named `Asset - {title}`. A `"English/Français"`
/// title is split between the languages.
pub fn asset_options(assets: &IndexMap<String, Asset>) -> Vec<GeoCoreOption> {
    assets
        .values()
        .map(|asset| {
            let title = Bilingual::split_pair(asset.title.as_deref().unwrap_or(DEFAULT_ASSET_TITLE));
            GeoCoreOption {
                url: asset.href.clone(),
                protocol: UNKNOWN_PROTOCOL.to_string(),
                name: title.map(|t| format!("Asset - {}", t)),
                description: description_for(asset.media_type.as_deref()),
            }
        })
        .collect()
}

/// Drop every option that has an identical copy later in the list.
///
/// Surviving entries keep their relative order and each one is the last
/// occurrence of its value. Applying this twice changes nothing.
pub fn dedup_options(options: Vec<GeoCoreOption>) -> Vec<GeoCoreOption> {
    let mut kept = Vec::with_capacity(options.len());
    for (n, option) in options.iter().enumerate() {
        if !options[n + 1..].contains(option) {
            kept.push(option.clone());
        }
    }
    kept
}
