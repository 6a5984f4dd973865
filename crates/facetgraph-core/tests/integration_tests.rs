//! Facetgraph Core Integration Tests

use std::sync::{Arc, Mutex};

use facetgraph_core::{
    Error,
    domain::{Category, Entity, FacetProperty, PropertyType, Relationship, Tag, Tagged, Value},
    model::Model,
    query::{AggregateCallbacks, QueryCallbacks},
    repository::Repository,
};
use futures_util::TryStreamExt;

type Log = Arc<Mutex<Vec<String>>>;

fn entity_log() -> (Log, QueryCallbacks) {
    let log: Log = Arc::default();
    let (a, c, r) = (log.clone(), log.clone(), log.clone());
    let callbacks = QueryCallbacks::new().with_entities(
        AggregateCallbacks::new()
            .on_added(move |e: &Entity| a.lock().unwrap().push(format!("added {}", e.name)))
            .on_changed(move |e: &Entity| c.lock().unwrap().push(format!("changed {}", e.name)))
            .on_removed(move |e: &Entity| r.lock().unwrap().push(format!("removed {}", e.name))),
    );
    (log, callbacks)
}

fn drain(log: &Log) -> Vec<String> {
    std::mem::take(&mut *log.lock().unwrap())
}

async fn child(model: &Model, parent: &mut Category, name: &str) -> Category {
    let mut category = Category::new(name);
    parent.add_sub_category(&mut category);
    model.categories().upsert(&category).await.unwrap();
    model.categories().upsert(parent).await.unwrap();
    category
}

#[tokio::test]
async fn test_names_are_unique() {
    let model = Model::in_memory().await.unwrap();

    model.tags().upsert(&Tag::new("person")).await.unwrap();
    let err = model.tags().upsert(&Tag::new("person")).await.unwrap_err();
    assert!(matches!(err, Error::DuplicateName { .. }));

    model.entities().upsert(&Entity::new("ada")).await.unwrap();
    let err = model.entities().upsert(&Entity::new("ada")).await.unwrap_err();
    assert!(matches!(err, Error::DuplicateName { .. }));

    let mut root = model.categories().root().await.unwrap();
    child(&model, &mut root, "people").await;
    let mut twin = Category::new("people");
    root.add_sub_category(&mut twin);
    let err = model.categories().upsert(&twin).await.unwrap_err();
    assert!(matches!(err, Error::DuplicateName { .. }));
}

#[tokio::test]
async fn test_referenced_entity_survives_delete() {
    let model = Model::in_memory().await.unwrap();
    let ada = Entity::new("ada");
    let charles = Entity::new("charles");
    model.entities().upsert(&ada).await.unwrap();
    model.entities().upsert(&charles).await.unwrap();
    let knows = Relationship::new("knows", &ada, &charles);
    model.relationships().upsert(&knows).await.unwrap();

    assert!(!model.entities().delete(&charles).await.unwrap());
    assert!(model.entities().find_by_id(charles.id).await.is_ok());

    assert!(model.relationships().delete(&knows).await.unwrap());
    assert!(model.entities().delete(&charles).await.unwrap());
    assert!(
        model
            .entities()
            .find_by_id(charles.id)
            .await
            .unwrap_err()
            .is_not_found()
    );
}

#[tokio::test]
async fn test_root_category_invariants() {
    let model = Model::in_memory().await.unwrap();
    let root = model.categories().root().await.unwrap();
    let removal = model.removal_traverser();

    assert!(!removal.delete_if_empty(&root).await.unwrap());
    assert!(!removal.delete_recursively(&root).await.unwrap());

    let orphan = Category::new("orphan");
    let err = model.categories().upsert(&orphan).await.unwrap_err();
    assert!(matches!(err, Error::CategoryMustHaveParent(_)));
    assert!(err.to_string().starts_with("Category must have parent."));
}

#[tokio::test]
async fn test_copy_category_fidelity() {
    let model = Model::in_memory().await.unwrap();
    let mut flag = FacetProperty::new("active", PropertyType::Bool);
    let mut tag = Tag::new("person");
    flag = tag.facet_mut().add_property(flag).unwrap().clone();
    let tag = model.tags().upsert(&tag).await.unwrap();

    let mut root = model.categories().root().await.unwrap();
    let mut src = child(&model, &mut root, "src").await;
    let dst = child(&model, &mut root, "dst").await;
    child(&model, &mut src, "nested").await;

    let mut ada = Entity::new("ada").with_category(src.id).with_tag(tag);
    ada.set_facet_property(&flag, Some("true")).unwrap();
    model.entities().upsert(&ada).await.unwrap();

    let src_before = model.categories().find_by_id(src.id).await.unwrap();
    let copy = model.copy_traverser().copy_category(&src, &dst).await.unwrap();

    let dst_after = model.categories().find_by_id(dst.id).await.unwrap();
    assert_eq!(dst_after.sub_categories(), &[copy.id]);
    assert_eq!(copy.name, "src");
    assert_ne!(copy.id, src.id);
    assert_eq!(copy.sub_categories().len(), 1);

    let copied = model.entities().find_by_category(Some(copy.id)).await.unwrap();
    assert_eq!(copied.len(), 1);
    assert_eq!(copied[0].name, "ada");
    assert_ne!(copied[0].id, ada.id);
    assert_eq!(copied[0].tags, ada.tags);
    assert_eq!(copied[0].facet_value(flag.id), Some(&Value::Bool(true)));

    let src_after = model.categories().find_by_id(src.id).await.unwrap();
    assert_eq!(src_after, src_before);
    assert_eq!(
        model.entities().find_by_category(Some(src.id)).await.unwrap(),
        vec![ada]
    );
}

#[tokio::test]
async fn test_tag_query_edges() {
    let model = Model::in_memory().await.unwrap();
    let tag = model.tags().upsert(&Tag::new("person")).await.unwrap();
    let mut ada = Entity::new("ada");
    model.entities().upsert(&ada).await.unwrap();

    let (log, callbacks) = entity_log();
    let query = model.tag_query(tag.clone(), callbacks).await.unwrap();
    assert!(drain(&log).is_empty());

    ada.add_tag(tag.clone());
    model.entities().upsert(&ada).await.unwrap();
    assert_eq!(drain(&log), vec!["added ada"]);

    model.entities().upsert(&ada).await.unwrap();
    assert_eq!(drain(&log), vec!["changed ada"]);

    ada.remove_tag(tag.id);
    model.entities().upsert(&ada).await.unwrap();
    assert_eq!(drain(&log), vec!["removed ada"]);
    assert!(!query.contains_entity(ada.id));
}

#[tokio::test]
async fn test_multi_tag_query_deduplicates() {
    let model = Model::in_memory().await.unwrap();
    let t1 = model.tags().upsert(&Tag::new("t1")).await.unwrap();
    let t2 = model.tags().upsert(&Tag::new("t2")).await.unwrap();
    let both = Entity::new("both").with_tag(t1.clone()).with_tag(t2.clone());
    model.entities().upsert(&both).await.unwrap();

    for order in [[&t2, &t1], [&t1, &t2]] {
        let (log, callbacks) = entity_log();
        let mut query = model.multi_tag_query(callbacks);
        assert!(query.add(order[0].clone()).await.unwrap());
        assert!(query.add(order[1].clone()).await.unwrap());
        assert_eq!(drain(&log), vec!["added both"]);

        assert!(query.remove(order[0].id));
        assert!(!drain(&log).contains(&"removed both".to_string()));
        assert!(query.contains_entity(both.id));

        assert!(query.remove(order[1].id));
        assert_eq!(drain(&log), vec!["removed both"]);
        assert!(query.entities().is_empty());
    }
}

#[tokio::test]
async fn test_multi_tag_query_untagging() {
    let model = Model::in_memory().await.unwrap();
    let t1 = model.tags().upsert(&Tag::new("t1")).await.unwrap();
    let t2 = model.tags().upsert(&Tag::new("t2")).await.unwrap();
    let mut both = Entity::new("both").with_tag(t1.clone()).with_tag(t2.clone());
    model.entities().upsert(&both).await.unwrap();

    let (log, callbacks) = entity_log();
    let mut query = model.multi_tag_query(callbacks);
    query.add(t1.clone()).await.unwrap();
    query.add(t2.clone()).await.unwrap();
    drain(&log);

    both.remove_tag(t1.id);
    model.entities().upsert(&both).await.unwrap();
    assert!(!drain(&log).contains(&"removed both".to_string()));

    both.remove_tag(t2.id);
    model.entities().upsert(&both).await.unwrap();
    assert_eq!(drain(&log), vec!["removed both"]);
}

#[tokio::test]
async fn test_facet_typing() {
    let bool_prop = FacetProperty::new("flag", PropertyType::Bool);
    assert!(bool_prop.can_assign_value(Some("true")));
    assert!(!bool_prop.can_assign_value(Some("notabool")));
    assert!(bool_prop.can_assign_value(None));

    let mut entity = Entity::new("e");
    let err = entity
        .set_facet_property(&bool_prop, Some("notabool"))
        .unwrap_err();
    assert!(matches!(err, Error::IncompatibleValue { .. }));
    assert!(entity.facet_value(bool_prop.id).is_none());
}

#[tokio::test]
async fn test_find_all_streams_every_item() {
    let model = Model::in_memory().await.unwrap();
    for name in ["a", "b", "c"] {
        model.tags().upsert(&Tag::new(name)).await.unwrap();
    }

    let names: Vec<String> = model
        .tags()
        .find_all()
        .map_ok(|t| t.name)
        .try_collect()
        .await
        .unwrap();
    assert_eq!(names, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn test_file_backed_model_persists() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("graph.db");

    let model = Model::open(facetgraph_core::storage::DatabaseConfig::with_path(&path))
        .await
        .unwrap();
    let tag = model.tags().upsert(&Tag::new("kept")).await.unwrap();
    model
        .entities()
        .upsert(&Entity::new("e").with_tag(tag.clone()))
        .await
        .unwrap();
    model.close().await;

    let reopened = Model::open(facetgraph_core::storage::DatabaseConfig::with_path(&path))
        .await
        .unwrap();
    let found = reopened.entities().find_by_tag(tag.id).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].tags, vec![tag]);
}
