//! URL slugs.
//!
//! Product URLs look like `/shop/product/{slugify(name)}-{id}`. The id makes
//! the slug unique; the name part only has to be stable.

use unicode_normalization::UnicodeNormalization;

use crate::ProductId;

/// Lowercase ASCII slug: runs of whitespace, `_` and `-` become one `-`,
/// other punctuation is dropped.
///
/// Input is NFKD-decomposed first, so accented letters keep their ASCII base
/// (`ż` becomes `z`). Letters without one, like `ł`, are dropped.
#[must_use]
pub fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    let mut pending_separator = false;

    for c in value.nfkd() {
        if c.is_ascii_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push('-');
            }
            pending_separator = false;
            slug.push(c.to_ascii_lowercase());
        } else if c.is_whitespace() || c == '_' || c == '-' {
            pending_separator = true;
        }
    }
    slug
}

/// Canonical slug of a product page.
#[must_use]
pub fn product_slug(name: &str, id: ProductId) -> String {
    let base = slugify(name);
    if base.is_empty() {
        id.to_string()
    } else {
        format!("{base}-{id}")
    }
}

/// Product id carried in the last `-` segment of a product slug.
#[must_use]
pub fn product_id_from_slug(slug: &str) -> Option<ProductId> {
    slug.rsplit('-').next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Garden Rake  XL"), "garden-rake-xl");
        assert_eq!(slugify("  trim_me -- please "), "trim-me-please");
        assert_eq!(slugify("Tea (100g) & more!"), "tea-100g-more");
        assert_eq!(slugify("Żółw"), "zow");
    }

    #[test]
    fn test_slugify_keeps_base_of_accented_letters() {
        assert_eq!(slugify("Kubek żółty"), "kubek-zoty");
        assert_eq!(slugify("Czajnik Łódź"), "czajnik-odz");
        assert_eq!(slugify("Szklanka ŚWIĘTA 0,5 l"), "szklanka-swieta-05-l");
        assert_eq!(slugify("ﬁligranowy"), "filigranowy");
    }

    #[test]
    fn test_polish_product_slug_round_trip() {
        let slug = product_slug("Garnek żeliwny", ProductId::new(17));
        assert_eq!(slug, "garnek-zeliwny-17");
        assert_eq!(product_id_from_slug(&slug), Some(ProductId::new(17)));
    }

    #[test]
    fn test_product_slug_round_trip() {
        let slug = product_slug("Steel Shovel", ProductId::new(42));
        assert_eq!(slug, "steel-shovel-42");
        assert_eq!(product_id_from_slug(&slug), Some(ProductId::new(42)));
    }

    #[test]
    fn test_product_id_from_bad_slug() {
        assert_eq!(product_id_from_slug("steel-shovel"), None);
        assert_eq!(product_id_from_slug(""), None);
    }

    #[test]
    fn test_symbol_only_name_falls_back_to_id() {
        assert_eq!(product_slug("!!!", ProductId::new(9)), "9");
    }
}
