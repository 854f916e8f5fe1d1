mod support;

use std::collections::BTreeMap;

use arbor::application::guard::Actor;
use arbor::application::options::{CreateOptionCommand, OptionError, UpdateOptionCommand};
use arbor::cache::{CacheConfig, CachedOption};
use arbor::domain::capability::Capability;
use arbor::domain::error::DomainError;
use arbor::domain::options::Autoload;

use support::{ADMIN, SUBSCRIBER, TestApp};

fn create(name: &str, value: &str) -> CreateOptionCommand {
    CreateOptionCommand {
        name: name.to_string(),
        value: value.to_string(),
        autoload: Autoload::Yes,
    }
}

#[tokio::test]
async fn created_option_is_served_without_another_store_read() {
    let app = TestApp::new("t_");

    let record = app
        .options
        .create(ADMIN, create("site_title", "Arbor"))
        .await
        .expect("create option");
    assert_eq!(record.option_name, "t_site_title");

    let reads = app.store.option_reads();
    let value = app.options.get_value("site_title").await.expect("get value");

    assert_eq!(value.as_deref(), Some("Arbor"));
    assert_eq!(app.store.option_reads(), reads);
}

#[tokio::test]
async fn prefixed_row_wins_over_unprefixed_alias() {
    let app = TestApp::new("t_");
    app.store.put_option("site_title", "A", Autoload::Yes);
    app.store.put_option("t_site_title", "B", Autoload::Yes);

    let value = app.options.get_value("site_title").await.expect("get value");
    assert_eq!(value.as_deref(), Some("B"));

    let autoload = app.options.autoload().await.expect("autoload");
    assert_eq!(
        autoload,
        BTreeMap::from([("site_title".to_string(), "B".to_string())])
    );
}

#[tokio::test]
async fn unprefixed_row_is_used_when_no_prefixed_row_exists() {
    let app = TestApp::new("t_");
    app.store.put_option("blog_charset", "UTF-8", Autoload::Yes);

    let value = app.options.get_value(" blog_charset ").await.expect("get value");
    assert_eq!(value.as_deref(), Some("UTF-8"));
}

#[tokio::test]
async fn external_writes_stay_invisible_until_invalidated() {
    let app = TestApp::new("t_");
    app.store.put_option("blog_charset", "UTF-8", Autoload::Yes);

    assert_eq!(
        app.options.get_value("blog_charset").await.expect("first read").as_deref(),
        Some("UTF-8")
    );

    app.store.put_option("blog_charset", "latin1", Autoload::Yes);
    assert_eq!(
        app.options.get_value("blog_charset").await.expect("cached read").as_deref(),
        Some("UTF-8")
    );

    app.cache.invalidate("blog_charset");
    assert_eq!(
        app.options.get_value("blog_charset").await.expect("fresh read").as_deref(),
        Some("latin1")
    );
}

#[tokio::test]
async fn missing_options_are_remembered() {
    let app = TestApp::new("t_");

    let before = app.store.option_reads();
    assert_eq!(app.options.get_value("nope").await.expect("read"), None);
    assert_eq!(app.options.get_value("nope").await.expect("read"), None);

    assert_eq!(app.store.option_reads(), before + 1);
    assert_eq!(app.cache.peek("nope"), Some(CachedOption::Missing));
}

#[tokio::test]
async fn disabled_cache_reads_the_store_every_time() {
    let app = TestApp::with_cache(
        "t_",
        CacheConfig {
            enable_option_cache: false,
        },
    );
    app.store.put_option("home", "https://example.test", Autoload::Yes);

    let before = app.store.option_reads();
    app.options.get_value("home").await.expect("read");
    app.options.get_value("home").await.expect("read");

    assert_eq!(app.store.option_reads(), before + 2);
    assert!(app.cache.is_empty());
}

#[tokio::test]
async fn update_refreshes_the_logical_entry() {
    let app = TestApp::new("t_");
    let legacy = app.store.put_option("tagline", "old", Autoload::Yes);

    assert_eq!(
        app.options.get_value("tagline").await.expect("read").as_deref(),
        Some("old")
    );

    let updated = app
        .options
        .update(
            ADMIN,
            UpdateOptionCommand {
                id: legacy.id,
                value: "new".to_string(),
                autoload: Autoload::No,
            },
        )
        .await
        .expect("update option");
    assert_eq!(updated.autoload, Autoload::No);

    assert_eq!(
        app.options.get_value("tagline").await.expect("read").as_deref(),
        Some("new")
    );
}

#[tokio::test]
async fn delete_falls_back_to_the_remaining_alias() {
    let app = TestApp::new("t_");
    app.store.put_option("site_title", "A", Autoload::Yes);
    let prefixed = app
        .options
        .create(ADMIN, create("site_title_override", "ignored"))
        .await
        .expect("create");
    let tenant = app.store.put_option("t_site_title", "B", Autoload::Yes);

    assert_eq!(
        app.options.get_value("site_title").await.expect("read").as_deref(),
        Some("B")
    );

    app.options.delete(ADMIN, tenant.id).await.expect("delete");
    assert_eq!(
        app.options.get_value("site_title").await.expect("read").as_deref(),
        Some("A")
    );

    app.options.delete(ADMIN, prefixed.id).await.expect("delete");
    assert_eq!(
        app.options
            .get_value("site_title_override")
            .await
            .expect("read"),
        None
    );
}

#[tokio::test]
async fn create_rejects_names_taken_by_either_alias() {
    let app = TestApp::new("t_");
    app.store.put_option("site_title", "A", Autoload::Yes);

    let err = app
        .options
        .create(ADMIN, create("site_title", "B"))
        .await
        .expect_err("duplicate");

    assert!(matches!(err, OptionError::Duplicate { name } if name == "site_title"));
    assert_eq!(app.store.writes(), 0);
}

#[tokio::test]
async fn writes_require_manage_options() {
    let app = TestApp::new("t_");
    let existing = app.store.put_option("home", "https://example.test", Autoload::Yes);

    for actor in [SUBSCRIBER, Actor::Anonymous, Actor::User(99)] {
        let err = app
            .options
            .create(actor, create("site_title", "nope"))
            .await
            .expect_err("forbidden create");
        assert!(matches!(
            err,
            OptionError::Forbidden {
                capability: Capability::ManageOptions
            }
        ));

        let err = app
            .options
            .delete(actor, existing.id)
            .await
            .expect_err("forbidden delete");
        assert!(matches!(err, OptionError::Forbidden { .. }));
    }

    assert_eq!(app.store.writes(), 0);
    assert_eq!(
        app.store.option_value("home").as_deref(),
        Some("https://example.test")
    );
}

#[tokio::test]
async fn update_of_unknown_option_is_a_validation_error() {
    let app = TestApp::new("t_");

    let err = app
        .options
        .update(
            ADMIN,
            UpdateOptionCommand {
                id: 404,
                value: "x".to_string(),
                autoload: Autoload::Yes,
            },
        )
        .await
        .expect_err("unknown id");

    assert!(matches!(err, OptionError::Validation(_)));
    assert_eq!(app.store.writes(), 0);
}

#[tokio::test]
async fn reset_cache_drops_every_entry() {
    let app = TestApp::new("t_");
    app.store.put_option("home", "https://example.test", Autoload::Yes);
    app.options.get_value("home").await.expect("read");
    assert!(!app.cache.is_empty());

    app.options.reset_cache(ADMIN).await.expect("reset");
    assert!(app.cache.is_empty());
}

#[tokio::test]
async fn show_requires_manage_options() {
    let app = TestApp::new("t_");
    let record = app.store.put_option("home", "https://example.test", Autoload::Yes);

    let found = app
        .options
        .find_by_id(ADMIN, record.id)
        .await
        .expect("admin read");
    assert_eq!(found, Some(record.clone()));

    assert!(matches!(
        app.options.find_by_id(SUBSCRIBER, record.id).await,
        Err(OptionError::Forbidden { .. })
    ));
}

#[tokio::test]
async fn logical_names_carrying_the_tenant_prefix_are_rejected() {
    let app = TestApp::new("t_");
    app.store.put_option("t_foo", "unprefixed-looking", Autoload::Yes);

    let err = app.options.get_value("t_foo").await.expect_err("prefixed read");
    assert!(matches!(
        err,
        OptionError::Domain(DomainError::PrefixedOptionName { ref name, .. }) if name == "t_foo"
    ));
    assert_eq!(
        app.options.get_value("foo").await.expect("logical read").as_deref(),
        Some("unprefixed-looking")
    );

    let err = app
        .options
        .create(ADMIN, create("t_bar", "x"))
        .await
        .expect_err("prefixed create");
    assert!(matches!(err, OptionError::Domain(DomainError::PrefixedOptionName { .. })));
    assert_eq!(app.store.writes(), 0);
}
