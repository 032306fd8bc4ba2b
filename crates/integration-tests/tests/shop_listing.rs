//! Shop listing inputs: category paths from the URL and preferences from the
//! cookie. No services required.

use emporium_core::CategoryId;
use emporium_core::category::{Category, CategoryScope, CategoryTree};
use emporium_core::preferences::{
    self, Availability, PreferenceOptions, Preferences, PriceRange, SortOption,
};
use emporium_core::slug::{product_id_from_slug, product_slug};

fn category(id: i32, parent: Option<i32>, slug: &str) -> Category {
    Category {
        id: CategoryId::new(id),
        parent_id: parent.map(CategoryId::new),
        slug: slug.to_owned(),
        name: slug.to_owned(),
    }
}

fn catalog() -> CategoryTree {
    CategoryTree::build(vec![
        category(1, None, "home"),
        category(2, Some(1), "kitchen"),
        category(3, Some(2), "cutlery"),
        category(4, Some(2), "pots"),
        category(5, Some(1), "garden"),
        category(6, None, "toys"),
    ])
}

fn options() -> PreferenceOptions {
    PreferenceOptions::new(
        vec![12, 24],
        SortOption::ALL.to_vec(),
        Availability::ALL.to_vec(),
        Preferences {
            page_size: 12,
            sort: SortOption::Newest,
            availability: Availability::All,
            price_range: None,
        },
    )
    .expect("valid options")
}

fn scope(tree: &CategoryTree, path: &[&str]) -> Option<Vec<i32>> {
    let resolved = tree.resolve_slug_path(path[0], path.get(1).copied(), path.get(2).copied());
    tree.descendant_ids(&resolved)
        .ids()
        .map(|ids| ids.into_iter().map(|id| id.as_i32()).collect())
}

#[test]
fn test_category_urls_scope_listing() {
    let tree = catalog();

    assert_eq!(scope(&tree, &["home"]), Some(vec![1, 2, 3, 4, 5]));
    assert_eq!(scope(&tree, &["home", "kitchen"]), Some(vec![2, 3, 4]));
    assert_eq!(scope(&tree, &["home", "kitchen", "pots"]), Some(vec![4]));
    assert_eq!(scope(&tree, &["toys"]), Some(vec![6]));
}

#[test]
fn test_partially_resolved_url_keeps_deepest_match() {
    let tree = catalog();

    // "bikes" is not under "kitchen": the listing stays on kitchen
    assert_eq!(scope(&tree, &["home", "kitchen", "bikes"]), Some(vec![2, 3, 4]));
    assert!(matches!(
        tree.descendant_ids(&tree.resolve_slug_path("bikes", None, None)),
        CategoryScope::Unscoped
    ));
}

#[test]
fn test_product_breadcrumb_matches_listing_path() {
    let tree = catalog();

    let path: Vec<_> = tree
        .full_ancestor_path(CategoryId::new(3))
        .expect("path")
        .iter()
        .map(|c| c.slug.as_str())
        .collect();

    assert_eq!(path, ["home", "kitchen", "cutlery"]);
    assert_eq!(
        tree.resolve_slug_path(path[0], Some(path[1]), Some(path[2])).len(),
        3
    );
}

#[test]
fn test_product_slug_links_back_to_product() {
    let id = emporium_core::ProductId::new(1042);
    let slug = product_slug("Cast Iron Pot, 5 L", id);

    assert_eq!(product_id_from_slug(&slug), Some(id));
}

#[test]
fn test_preferences_cookie_survives_a_visit() {
    let options = options();
    let chosen = Preferences {
        page_size: 24,
        sort: SortOption::PriceDesc,
        availability: Availability::InStock,
        price_range: PriceRange::new(10, 250),
    };

    let cookie = preferences::encode(&chosen);
    let decoded = preferences::decode(Some(&cookie), &options);

    assert!(!decoded.is_default);
    assert_eq!(decoded.preferences, chosen);
}

#[test]
fn test_stale_cookie_falls_back_to_defaults() {
    let options = options();

    // Page size 48 was enabled once and has since been removed
    let stale = preferences::encode(&Preferences {
        page_size: 48,
        ..options.defaults()
    });
    for cookie in [Some(stale.as_str()), Some("not base64!"), None] {
        let decoded = preferences::decode(cookie, &options);
        assert!(decoded.is_default);
        assert_eq!(decoded.preferences, options.defaults());
    }
}
