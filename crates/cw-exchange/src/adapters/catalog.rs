//! Static item catalog.

use crate::ports::ItemCatalog;
use std::collections::HashMap;

/// Every tradeable item and its exchange code.
const ITEMS: &[(&str, &str)] = &[
    // Resources
    ("Thread", "01"),
    ("Stick", "02"),
    ("Pelt", "03"),
    ("Bone", "04"),
    ("Coal", "05"),
    ("Charcoal", "06"),
    ("Powder", "07"),
    ("Iron ore", "08"),
    ("Cloth", "09"),
    ("Silver ore", "10"),
    ("Bauxite", "11"),
    ("Magic stone", "13"),
    ("Sapphire", "15"),
    ("Solvent", "16"),
    ("Ruby", "17"),
    ("Hardener", "18"),
    ("Steel", "19"),
    ("Leather", "20"),
    ("Bone powder", "21"),
    ("String", "22"),
    ("Coke", "23"),
    ("Rope", "31"),
    ("Metal plate", "33"),
    ("Metallic fiber", "34"),
    ("Crafted leather", "35"),
    // Herbs
    ("Stinky Sumac", "39"),
    ("Mercy Sassafras", "40"),
    ("Cliff Rue", "41"),
    ("Love Creeper", "42"),
    ("Wolf Root", "43"),
    ("Swamp Lavender", "44"),
    ("White Blossom", "45"),
    ("Ilaves", "46"),
    ("Ephijora", "47"),
    ("Storm Hyssop", "48"),
    ("Cave Garlic", "49"),
    ("Yellow Seed", "50"),
    ("Tecceagrass", "51"),
    ("Spring Bay Leaf", "52"),
    ("Ash Rosemary", "53"),
    ("Sanguine Parsley", "54"),
    ("Sun Tarragon", "55"),
    ("Maccunut", "56"),
    ("Dragon Seed", "57"),
    ("Queen's Pepper", "58"),
    ("Plasma of abyss", "59"),
    ("Ultramarine dust", "60"),
    ("Ethereal bone", "61"),
    ("Itacory", "62"),
    ("Assassin Vine", "63"),
    ("Kloliarway", "64"),
    ("Astrulic", "65"),
    ("Flammia Nut", "66"),
    ("Plexisop", "67"),
    ("Mammoth Dill", "68"),
    ("Silver dust", "69"),
    // Farm
    ("Hay", "518"),
    ("Corn", "519"),
    ("Hamsters", "520"),
    ("Cheese", "521"),
    ("Zombie Chest", "ch1"),
    // Potions
    ("Vial of Rage", "p01"),
    ("Potion of Rage", "p02"),
    ("Bottle of Rage", "p03"),
    ("Vial of Peace", "p04"),
    ("Potion of Peace", "p05"),
    ("Bottle of Peace", "p06"),
    ("Vial of Greed", "p07"),
    ("Potion of Greed", "p08"),
    ("Bottle of Greed", "p09"),
    ("Vial of Nature", "p10"),
    ("Potion of Nature", "p11"),
    ("Bottle of Nature", "p12"),
    ("Vial of Mana", "p13"),
    ("Potion of Mana", "p14"),
    ("Bottle of Mana", "p15"),
    ("Vial of Twilight", "p16"),
    ("Potion of Twilight", "p17"),
    ("Bottle of Twilight", "p18"),
    ("Vial of Morph", "p19"),
    ("Potion of Morph", "p20"),
    ("Bottle of Morph", "p21"),
];

/// Item catalog backed by the built-in item table.
#[derive(Debug, Clone)]
pub struct StaticItemCatalog {
    codes: HashMap<&'static str, &'static str>,
}

impl StaticItemCatalog {
    pub fn new() -> Self {
        Self {
            codes: ITEMS.iter().copied().collect(),
        }
    }

    /// Catalog with extra or overriding entries.
    pub fn with_items<I>(items: I) -> Self
    where
        I: IntoIterator<Item = (&'static str, &'static str)>,
    {
        let mut catalog = Self::new();
        catalog.codes.extend(items);
        catalog
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

impl Default for StaticItemCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl ItemCatalog for StaticItemCatalog {
    fn code_for_item_name(&self, name: &str) -> Option<&str> {
        self.codes.get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_items() {
        let catalog = StaticItemCatalog::new();
        assert_eq!(catalog.code_for_item_name("Iron ore"), Some("08"));
        assert_eq!(catalog.code_for_item_name("Queen's Pepper"), Some("58"));
        assert_eq!(catalog.code_for_item_name("Bottle of Morph"), Some("p21"));
    }

    #[test]
    fn test_lookup_is_exact() {
        let catalog = StaticItemCatalog::new();
        assert_eq!(catalog.code_for_item_name("iron ore"), None);
        assert_eq!(catalog.code_for_item_name("Excalibur"), None);
    }

    #[test]
    fn test_codes_are_unique() {
        let mut codes: Vec<_> = ITEMS.iter().map(|(_, code)| *code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), ITEMS.len());
        assert_eq!(StaticItemCatalog::new().len(), ITEMS.len());
    }

    #[test]
    fn test_extra_items() {
        let catalog = StaticItemCatalog::with_items([("Mystery box", "x01")]);
        assert_eq!(catalog.code_for_item_name("Mystery box"), Some("x01"));
        assert_eq!(catalog.code_for_item_name("Thread"), Some("01"));
    }
}
