//! Model detection from USB identifiers.

use std::collections::HashMap;
use std::sync::LazyLock;

use streamdeck_core::{DeckError, Model, Result, ELGATO_VENDOR_ID};
use streamdeck_mini::Mini;
use streamdeck_mk2::Mk2;
use streamdeck_neo::Neo;
use streamdeck_plus::Plus;

/// Every supported model, in product id order
static MODELS: [&dyn Model; 4] = [&Mini, &Mk2, &Plus, &Neo];

static TABLE: LazyLock<HashMap<u16, &'static dyn Model>> = LazyLock::new(|| {
    MODELS
        .iter()
        .map(|model| (model.info().product_id, *model))
        .collect()
});

/// Hardware revisions sharing the descriptor of another product id
static ALIASES: LazyLock<HashMap<u16, u16>> = LazyLock::new(|| {
    HashMap::from([(streamdeck_mk2::consts::ALIAS_PRODUCT_ID, streamdeck_mk2::consts::PRODUCT_ID)])
});

/// Canonical product id, after applying the alias table once
pub fn canonical_product_id(product_id: u16) -> u16 {
    ALIASES.get(&product_id).copied().unwrap_or(product_id)
}

/// Find the model driving a device
pub fn resolve(vendor_id: u16, product_id: u16) -> Result<&'static dyn Model> {
    if vendor_id != ELGATO_VENDOR_ID {
        return Err(DeckError::NotSupported {
            vendor_id,
            product_id,
        });
    }
    TABLE
        .get(&canonical_product_id(product_id))
        .copied()
        .ok_or(DeckError::NotSupported {
            vendor_id,
            product_id,
        })
}

/// Enumeration filter
pub fn is_supported(vendor_id: u16, product_id: u16) -> bool {
    resolve(vendor_id, product_id).is_ok()
}

/// All supported models
pub fn models() -> &'static [&'static dyn Model] {
    &MODELS
}

/// Look up a model by its short id, such as `"plus"`
pub fn by_id(id: &str) -> Option<&'static dyn Model> {
    MODELS
        .iter()
        .find(|model| model.info().id.eq_ignore_ascii_case(id))
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_models() {
        for (pid, id) in [(0x0063, "mini"), (0x0080, "mk2"), (0x0084, "plus"), (0x009a, "neo")] {
            assert_eq!(resolve(ELGATO_VENDOR_ID, pid).unwrap().info().id, id);
        }
    }

    #[test]
    fn alias_resolves_to_same_descriptor() {
        let alias = resolve(ELGATO_VENDOR_ID, 0x006d).unwrap();
        let canonical = resolve(ELGATO_VENDOR_ID, 0x0080).unwrap();
        assert!(std::ptr::addr_eq(alias, canonical));
        assert_eq!(canonical_product_id(0x006d), 0x0080);
        assert_eq!(canonical_product_id(0x0084), 0x0084);
    }

    #[test]
    fn unknown_devices_are_not_supported() {
        let err = resolve(ELGATO_VENDOR_ID, 0x0060).unwrap_err();
        assert!(matches!(
            err,
            DeckError::NotSupported {
                vendor_id: ELGATO_VENDOR_ID,
                product_id: 0x0060
            }
        ));
        assert!(resolve(0x046d, 0x0080).is_err());
        assert!(!is_supported(0x046d, 0x0063));
        assert!(is_supported(ELGATO_VENDOR_ID, 0x006d));
    }

    #[test]
    fn lookup_by_id() {
        assert_eq!(by_id("NEO").unwrap().info().product_id, 0x009a);
        assert!(by_id("xl").is_none());
        assert_eq!(models().len(), 4);
    }
}
