use std::fmt;

/// One named upstream data bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Champion,
    Item,
    Spell,
    Map,
    Mastery,
    Version,
}

impl Resource {
    pub const ALL: [Resource; 6] = [
        Resource::Champion,
        Resource::Item,
        Resource::Spell,
        Resource::Map,
        Resource::Mastery,
        Resource::Version,
    ];

    /// Key under which the payload is cached.
    pub fn key(&self) -> &'static str {
        match self {
            Resource::Champion => "champion",
            Resource::Item => "item",
            Resource::Spell => "spell",
            Resource::Map => "map",
            Resource::Mastery => "mastery",
            Resource::Version => "version",
        }
    }

    /// Path segment below the static-data base path.
    pub fn upstream_path(&self) -> &'static str {
        match self {
            Resource::Champion => "champion",
            Resource::Item => "item",
            Resource::Spell => "summoner-spell",
            Resource::Map => "map",
            Resource::Mastery => "mastery",
            Resource::Version => "realm",
        }
    }

    /// Resource-specific query, without the credential.
    pub fn query(&self) -> Option<&'static str> {
        match self {
            Resource::Champion => Some("champData=image,skins,spells"),
            Resource::Item => Some(
                "itemListData=consumed,gold,hideFromAll,image,inStore,into,maps,requiredChampion,sanitizedDescription,tags",
            ),
            Resource::Spell => Some("spellData=image,key,modes,sanitizedDescription"),
            Resource::Mastery => Some("masteryListData=all"),
            Resource::Map | Resource::Version => None,
        }
    }

    /// Local route serving this resource.
    pub fn route(&self) -> &'static str {
        match self {
            Resource::Champion => "/champs",
            Resource::Item => "/items",
            Resource::Spell => "/spells",
            Resource::Map => "/maps",
            Resource::Mastery => "/masteries",
            Resource::Version => "/versions",
        }
    }

    /// The realm is served whole; every other resource serves its `data` field.
    pub fn serves_data_field(&self) -> bool {
        !matches!(self, Resource::Version)
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}
