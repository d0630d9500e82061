//! End-to-end behaviour of the element algebra through the public API.

use typeweave_element::{
    Element, ElementError, MergeOp, Override, Path, apply_overrides, element_map, merge,
    merge_all, remove, resolve, select,
};

fn path(text: &str) -> Path {
    Path::parse(text).unwrap()
}

fn overrides(texts: &[&str]) -> Vec<Override> {
    texts.iter().map(|t| Override::parse(t).unwrap()).collect()
}

#[test]
fn test_select_through_sequence() {
    let tree = element_map! { "a" => vec![Element::Int(1), element_map! { "b" => 2 }] };
    assert_eq!(select(&tree, &path("a.1.b")).unwrap(), &Element::Int(2));
}

#[test]
fn test_overrides_build_config_from_nothing() {
    let tree = apply_overrides(
        &Element::Missing,
        &overrides(&[
            "model.name=resnet",
            "model.layers=[64, 128]",
            "model.layers+=[256]",
            "train.lr=0.1",
            "train+={epochs: 3}",
        ]),
    )
    .unwrap();

    assert_eq!(
        tree,
        element_map! {
            "model" => element_map! {
                "name" => "resnet",
                "layers" => vec![64, 128, 256],
            },
            "train" => element_map! { "lr" => 0.1, "epochs" => 3 },
        }
    );
}

#[test]
fn test_override_sequence_is_ordered() {
    let tree = apply_overrides(&Element::map(), &overrides(&["a.b=1", "a.c=2", "~a.b"])).unwrap();
    assert_eq!(tree, element_map! { "a" => element_map! { "c" => 2 } });

    // Reordering the removal changes the result.
    let tree = apply_overrides(&Element::map(), &overrides(&["~a.b", "a.b=1", "a.c=2"])).unwrap();
    assert_eq!(tree, element_map! { "a" => element_map! { "b" => 1, "c" => 2 } });
}

#[test]
fn test_failing_override_leaves_input_untouched() {
    let base = element_map! { "a" => 1 };
    let err = apply_overrides(&base, &overrides(&["b=2", "a+=2"])).unwrap_err();
    assert!(matches!(err, ElementError::Override { index: 1, .. }));
    assert_eq!(base, element_map! { "a" => 1 });
}

#[test]
fn test_combine_same_key_new_scalar_wins() {
    let base = element_map! { "m" => element_map! { "k" => "old" } };
    let tree = apply_overrides(&base, &overrides(&["m+={k: new}"])).unwrap();
    assert_eq!(tree, element_map! { "m" => element_map! { "k" => "new" } });
}

#[test]
fn test_remove_twice_equals_remove_once() {
    let tree = element_map! { "x" => element_map! { "y" => 1, "z" => 2 } };
    let once = remove(&tree, &path("x.y")).unwrap();
    assert_eq!(remove(&once, &path("x.y")).unwrap(), once);
}

#[test]
fn test_layered_merge() {
    let defaults = element_map! { "server" => element_map! { "port" => 80, "hosts" => vec!["a"] } };
    let site = element_map! { "server" => element_map! { "hosts" => vec!["b"] } };
    let local = element_map! { "server" => element_map! { "port" => 8080 } };

    let concat = merge_all([&defaults, &site, &local], MergeOp::Concat).unwrap();
    assert_eq!(
        concat,
        element_map! { "server" => element_map! { "port" => 8080, "hosts" => vec!["a", "b"] } }
    );

    let prefer = merge_all([&defaults, &site, &local], MergeOp::Prefer).unwrap();
    assert_eq!(
        prefer,
        element_map! { "server" => element_map! { "port" => 8080, "hosts" => vec!["b"] } }
    );

    assert_eq!(merge(&defaults, &Element::Missing).unwrap(), defaults);
}

#[test]
fn test_resolve_after_dotted_overrides() {
    let tree = element_map! {
        "_meta_" => element_map! { "source" => "cli" },
        "a.b" => 1,
    };
    assert_eq!(
        resolve(&tree).unwrap(),
        element_map! { "a" => element_map! { "b" => 1 } }
    );
}
