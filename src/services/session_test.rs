use super::*;

fn user() -> SessionUser {
    SessionUser {
        id: 42,
        name: "alice".into(),
        email: Some("alice@example.com".into()),
        avatar_url: Some("https://cdn.example.com/a.png".into()),
        is_admin: true,
    }
}

#[test]
fn view_projects_public_fields() {
    let view = user().view();
    assert_eq!(view.id, 42);
    assert_eq!(view.name, "alice");
    assert_eq!(view.avatar_url.as_deref(), Some("https://cdn.example.com/a.png"));
}

#[test]
fn view_never_leaks_credentials() {
    let value = serde_json::to_value(user().view()).expect("serialize");
    let text = value.to_string();
    assert!(!text.contains("alice@example.com"), "email must not cross the wire");
    assert!(value.get("email").is_none());
    assert!(value.get("isAdmin").is_none());
    assert!(value.get("is_admin").is_none());
}
