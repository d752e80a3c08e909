//! Integration tests for the pinner: persistence, classification,
//! exclusivity and reader/writer interleaving.

use std::collections::HashSet;
use std::sync::Arc;

use pins::prelude::*;
use pins::linked_data::cid_for_block;
use pins::pin::SetConfig;

fn test_cid(i: u32) -> Cid {
    cid_for_block(&i.to_le_bytes()).unwrap()
}

fn setup() -> (Pinner, MemDagStore, MemDatastore) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    let dag = MemDagStore::new();
    let repo = MemDatastore::new();
    let pinner = Pinner::new(Arc::new(dag.clone()), Arc::new(repo.clone())).unwrap();
    (pinner, dag, repo)
}

/// Store a small two-level DAG and return (root, child, grandchild).
async fn setup_dag(dag: &MemDagStore) -> (Cid, Cid, Cid) {
    let grandchild = Node::new(b"grandchild".to_vec(), Vec::new());
    let grandchild_cid = dag.put(&grandchild).await.unwrap();

    let child = Node::new(
        b"child".to_vec(),
        vec![Link::new("deep", 1, grandchild_cid)],
    );
    let child_cid = dag.put(&child).await.unwrap();

    let root = Node::new(b"root".to_vec(), vec![Link::new("sub", 1, child_cid)]);
    let root_cid = dag.put(&root).await.unwrap();

    (root_cid, child_cid, grandchild_cid)
}

#[tokio::test]
async fn test_load_empty_repo() {
    let (pinner, _, _) = setup();
    pinner.load().await.unwrap();
    assert!(pinner.direct_keys().is_empty());
    assert!(pinner.recursive_keys().is_empty());
    assert_eq!(pinner.root(), None);
}

#[tokio::test]
async fn test_small_set_survives_reload() {
    let (pinner, dag, repo) = setup();
    let a = test_cid(1);
    let b = test_cid(2);
    pinner.add_direct(&[a, b]).await.unwrap();

    let fresh = Pinner::new(Arc::new(dag), Arc::new(repo)).unwrap();
    fresh.load().await.unwrap();

    let direct: HashSet<Cid> = fresh.direct_keys().into_iter().collect();
    assert_eq!(direct, HashSet::from([a, b]));
    assert!(fresh.recursive_keys().is_empty());
}

#[tokio::test]
async fn test_sharded_set_survives_reload() {
    let dag = MemDagStore::new();
    let repo = MemDatastore::new();
    let config = SetConfig {
        fanout: 4,
        max_items: 2,
    };
    let pinner =
        Pinner::with_config(Arc::new(dag.clone()), Arc::new(repo.clone()), config).unwrap();

    let keys: Vec<Cid> = (0..30).map(test_cid).collect();
    pinner.add_recursive(&keys[..10]).await.unwrap();
    pinner.add_direct(&keys[10..]).await.unwrap();

    let fresh = Pinner::with_config(Arc::new(dag), Arc::new(repo), config).unwrap();
    fresh.load().await.unwrap();

    let recursive: HashSet<Cid> = fresh.recursive_keys().into_iter().collect();
    let direct: HashSet<Cid> = fresh.direct_keys().into_iter().collect();
    assert_eq!(recursive, keys[..10].iter().copied().collect());
    assert_eq!(direct, keys[10..].iter().copied().collect());
}

#[tokio::test]
async fn test_add_is_idempotent() {
    let (pinner, _, repo) = setup();
    let key = test_cid(1);

    pinner.add_direct(&[key]).await.unwrap();
    let root = pinner.root().unwrap();
    let record = repo.get("/local/pins").await.unwrap().unwrap();

    pinner.add_direct(&[key]).await.unwrap();
    assert_eq!(pinner.root().unwrap(), root);
    assert_eq!(repo.get("/local/pins").await.unwrap().unwrap(), record);
}

#[tokio::test]
async fn test_exclusivity_across_mutations() {
    let (pinner, _, _) = setup();
    let a = test_cid(1);
    let b = test_cid(2);
    let c = test_cid(3);

    let assert_disjoint = |pinner: &Pinner| {
        let direct: HashSet<Cid> = pinner.direct_keys().into_iter().collect();
        let recursive: HashSet<Cid> = pinner.recursive_keys().into_iter().collect();
        assert!(direct.is_disjoint(&recursive));
    };

    pinner.add_direct(&[a, b]).await.unwrap();
    assert_disjoint(&pinner);

    // b is promoted out of the direct set
    pinner.add_recursive(&[b, c]).await.unwrap();
    assert_disjoint(&pinner);
    assert!(pinner.recursive_keys().contains(&b));
    assert!(!pinner.direct_keys().contains(&b));

    // the stronger recursive pin on c wins over a direct re-add
    pinner.add_direct(&[c]).await.unwrap();
    assert_disjoint(&pinner);
    assert!(pinner.recursive_keys().contains(&c));

    pinner.remove(&[b], true).await.unwrap();
    assert_disjoint(&pinner);
    assert!(!pinner.recursive_keys().contains(&b));

    pinner.remove(&[a], false).await.unwrap();
    assert_disjoint(&pinner);
    assert!(pinner.direct_keys().is_empty());
}

#[tokio::test]
async fn test_remove_without_recursive_intent_leaves_recursive_pin() {
    let (pinner, dag, _) = setup();
    let (root, _, _) = setup_dag(&dag).await;

    pinner.add_recursive(&[root]).await.unwrap();
    pinner.remove(&[root], false).await.unwrap();

    // non-recursive removal targets the direct set only
    assert!(pinner.recursive_keys().contains(&root));
}

#[tokio::test]
async fn test_is_pinned_with_type_filters() {
    let (pinner, dag, _) = setup();
    let (root, child, grandchild) = setup_dag(&dag).await;
    let direct = test_cid(7);

    pinner.add_recursive(&[root]).await.unwrap();
    pinner.add_direct(&[direct]).await.unwrap();

    let status = pinner.is_pinned_with_type(&root, PinMode::Recursive).await.unwrap();
    assert!(status.pinned);
    assert_eq!(status.reason, PinReason::Recursive);

    let status = pinner.is_pinned_with_type(&direct, PinMode::Direct).await.unwrap();
    assert!(status.pinned);
    assert_eq!(status.reason, PinReason::Direct);

    // a descendant is indirect, with the root it is reached through
    let status = pinner.is_pinned_with_type(&child, PinMode::Indirect).await.unwrap();
    assert!(status.pinned);
    assert_eq!(status.reason, PinReason::Indirect { via: root });

    let status = pinner
        .is_pinned_with_type(&grandchild, PinMode::All)
        .await
        .unwrap();
    assert!(status.pinned);
    assert_eq!(status.reason, PinReason::Indirect { via: root });

    // but it is not direct
    let status = pinner.is_pinned_with_type(&child, PinMode::Direct).await.unwrap();
    assert!(!status.pinned);
    assert_eq!(status.reason, PinReason::NotPinned);

    let status = pinner
        .is_pinned_with_type(&test_cid(1000), PinMode::All)
        .await
        .unwrap();
    assert!(!status.pinned);
}

#[tokio::test]
async fn test_indirect_keys() {
    let (pinner, dag, _) = setup();
    let (root, child, grandchild) = setup_dag(&dag).await;

    pinner.add_recursive(&[root]).await.unwrap();
    let indirect = pinner.indirect_keys().await.unwrap();
    assert_eq!(indirect, HashSet::from([child, grandchild]));
}

#[tokio::test]
async fn test_indirect_keys_exclude_recursive_members() {
    let (pinner, dag, _) = setup();
    let (root, child, _) = setup_dag(&dag).await;

    // a reachable key that is also recursively pinned is not indirect
    pinner.add_recursive(&[root, child]).await.unwrap();
    let indirect = pinner.indirect_keys().await.unwrap();
    assert!(!indirect.contains(&child));
}

#[tokio::test]
async fn test_internal_blocks_are_fetchable() {
    let (pinner, dag, _) = setup();
    let keys: Vec<Cid> = (0..40).map(test_cid).collect();
    pinner.add_direct(&keys).await.unwrap();
    pinner.add_recursive(&[test_cid(100)]).await.unwrap();

    let internal = pinner.internal_blocks().await.unwrap();

    // the root record and both set roots at minimum
    assert!(internal.contains(&pinner.root().unwrap()));
    assert!(internal.len() >= 3);
    for cid in &internal {
        dag.get(cid).await.unwrap();
    }
    // pinned content is not machinery
    for key in &keys {
        assert!(!internal.contains(key));
    }
}

#[tokio::test]
async fn test_invalid_pin_type_is_rejected() {
    let err = "everything".parse::<PinMode>().unwrap_err();
    assert!(matches!(err, PinError::InvalidPinType(_)));
}

#[tokio::test]
async fn test_concurrent_readers_never_see_torn_state() {
    let (pinner, dag, _) = setup();
    let pinner = Arc::new(pinner);

    let mut roots = Vec::new();
    for i in 0..20 {
        let leaf = Node::new(format!("leaf-{i}").into_bytes(), Vec::new());
        let leaf_cid = dag.put(&leaf).await.unwrap();
        let root = Node::new(
            format!("root-{i}").into_bytes(),
            vec![Link::new("", 1, leaf_cid)],
        );
        roots.push(dag.put(&root).await.unwrap());
    }

    let writer = {
        let pinner = pinner.clone();
        let roots = roots.clone();
        tokio::spawn(async move {
            for root in roots {
                pinner.add_recursive(&[root]).await.unwrap();
            }
        })
    };

    let mut readers = Vec::new();
    for _ in 0..8 {
        let pinner = pinner.clone();
        let probe = roots[roots.len() / 2];
        readers.push(tokio::spawn(async move {
            for _ in 0..50 {
                // a read either sees the pre- or post-mutation set,
                // never a torn root
                let status = pinner.is_pinned(&probe).await.unwrap();
                if status.pinned {
                    assert!(matches!(
                        status.reason,
                        PinReason::Recursive | PinReason::Indirect { .. }
                    ));
                }
                tokio::task::yield_now().await;
            }
        }));
    }

    writer.await.unwrap();
    for reader in readers {
        reader.await.unwrap();
    }

    let recursive: HashSet<Cid> = pinner.recursive_keys().into_iter().collect();
    assert_eq!(recursive, roots.into_iter().collect());
}

#[tokio::test]
async fn test_reload_resynchronizes_after_external_change() {
    let (pinner, dag, repo) = setup();
    let a = test_cid(1);
    pinner.add_direct(&[a]).await.unwrap();

    // a second pinner over the same repo mutates durable state
    let other = Pinner::new(Arc::new(dag.clone()), Arc::new(repo.clone())).unwrap();
    other.load().await.unwrap();
    other.remove(&[a], false).await.unwrap();
    other.add_direct(&[test_cid(2)]).await.unwrap();

    pinner.load().await.unwrap();
    assert!(!pinner.direct_keys().contains(&a));
    assert!(pinner.direct_keys().contains(&test_cid(2)));
}
