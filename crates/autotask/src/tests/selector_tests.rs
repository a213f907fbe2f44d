//! Tests for selector parsing and strategy matching

use crate::element::{ElementAttributes, ElementNode, Point};
use crate::selector::{ElementMatchStrategy, Selector};

fn node(id: Option<&str>, text: Option<&str>, desc: Option<&str>, class: Option<&str>) -> ElementNode {
    ElementNode::new(
        ElementAttributes {
            resource_id: id.map(String::from),
            text: text.map(String::from),
            description: desc.map(String::from),
            class_name: class.map(String::from),
            ..Default::default()
        },
        vec![],
    )
}

#[test]
fn test_selector_prefixes() {
    assert_eq!(Selector::from("id:login"), Selector::Id("login".to_string()));
    assert_eq!(Selector::from("#login"), Selector::Id("login".to_string()));
    assert_eq!(Selector::from("TEXT: Sign in"), Selector::Text("Sign in".to_string()));
    assert_eq!(
        Selector::from("desc:Navigate up"),
        Selector::Description("Navigate up".to_string())
    );
    assert_eq!(
        Selector::from("description:Navigate up"),
        Selector::Description("Navigate up".to_string())
    );
    assert_eq!(
        Selector::from("class:android.widget.Button"),
        Selector::ClassName("android.widget.Button".to_string())
    );
    assert_eq!(Selector::from("coords:10,20"), Selector::Coordinates(Point::new(10, 20)));
    assert_eq!(Selector::from("540, 960"), Selector::Coordinates(Point::new(540, 960)));
    assert_eq!(Selector::from("Settings"), Selector::Text("Settings".to_string()));
}

#[test]
fn test_invalid_selectors() {
    assert!(matches!(Selector::from("   "), Selector::Invalid(_)));
    assert!(matches!(Selector::from("coords:abc"), Selector::Invalid(_)));
    assert_eq!(Selector::from("   ").strategy(), None);
}

#[test]
fn test_selector_display_round_trips_through_parsing() {
    for raw in ["id:login", "text:OK", "desc:Back", "class:android.widget.Button", "coords:1,2"] {
        let selector = Selector::from(raw);
        assert_eq!(Selector::from(selector.to_string()), selector, "{raw}");
    }
}

#[test]
fn test_by_id_matches_full_name_or_suffix() {
    let button = node(Some("com.example:id/login_button"), None, None, None);
    assert!(ElementMatchStrategy::ById.matches(&button, "login_button"));
    assert!(ElementMatchStrategy::ById.matches(&button, "com.example:id/login_button"));
    assert!(!ElementMatchStrategy::ById.matches(&button, "login"));
    assert!(!ElementMatchStrategy::ById.matches(&node(None, Some("login_button"), None, None), "login_button"));
}

#[test]
fn test_text_and_description_are_exact() {
    let label = node(None, Some("Sign in"), Some("Sign in button"), Some("android.widget.Button"));
    assert!(ElementMatchStrategy::ByText.matches(&label, "Sign in"));
    assert!(!ElementMatchStrategy::ByText.matches(&label, "Sign"));
    assert!(ElementMatchStrategy::ByDescription.matches(&label, "Sign in button"));
    assert!(!ElementMatchStrategy::ByDescription.matches(&label, "Sign in"));
    assert!(ElementMatchStrategy::ByClassName.matches(&label, "android.widget.Button"));
    assert!(!ElementMatchStrategy::ByCoordinates.matches(&label, "0,0"));
}

#[test]
fn test_strategy_wire_names() {
    let json = serde_json::to_string(&ElementMatchStrategy::ByCoordinates).unwrap();
    assert_eq!(json, "\"BY_COORDINATES\"");
    let parsed: ElementMatchStrategy = serde_json::from_str("\"BY_CLASS_NAME\"").unwrap();
    assert!(parsed.collects_all());
    assert_eq!(ElementMatchStrategy::default(), ElementMatchStrategy::ById);
}
