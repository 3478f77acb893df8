use std::path::Path;

use indexmap::IndexMap;
use proptest::prelude::*;
use yamlet::{evaluate_tree, MemoryReader, Node, Options};

/// Text that is never an expression scalar: no leading `(`.
fn plain_text() -> impl Strategy<Value = String> {
    "[a-z0-9 +*/.-]{0,12}".prop_filter("looks like an expression", |s| {
        !s.trim_start().starts_with('(')
    })
}

fn plain_node() -> impl Strategy<Value = Node> {
    let leaf = prop_oneof![
        Just(Node::Null),
        any::<bool>().prop_map(Node::Bool),
        any::<i64>().prop_map(Node::Int),
        (-1.0e6f64..1.0e6).prop_map(Node::Float),
        plain_text().prop_map(Node::Text),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Node::Sequence),
            prop::collection::vec(("[a-z]{1,6}", inner), 0..4).prop_map(|entries| {
                Node::Mapping(entries.into_iter().collect::<IndexMap<_, _>>())
            }),
        ]
    })
}

fn evaluate_result(result: Node) -> Node {
    let mut root = IndexMap::new();
    root.insert("result".to_string(), result);
    evaluate_tree(
        &MemoryReader::new(),
        Path::new("prop.yaml"),
        Node::Mapping(root),
        &Options::default(),
    )
    .expect("plain data evaluates")
}

fn evaluate_expression(source: &str) -> Node {
    evaluate_result(Node::text(format!("({})", source)))
}

proptest! {
    #[test]
    fn plain_data_is_copied_unchanged(node in plain_node()) {
        prop_assert_eq!(evaluate_result(node.clone()), node);
    }

    #[test]
    fn integer_arithmetic_matches_rust(a in -10_000i64..10_000, b in -10_000i64..10_000, c in 1i64..100) {
        // Literals are non-negative, so negative operands go in as `0 - n`.
        let lit = |n: i64| if n < 0 { format!("(0 - {})", -n) } else { n.to_string() };
        let source = format!("{} + {} * {} - {}", lit(a), lit(b), c, lit(a));
        prop_assert_eq!(evaluate_expression(&source), Node::Int(a + b * c - a));
    }

    #[test]
    fn division_yields_float(a in 0i64..10_000, b in 1i64..10_000) {
        let source = format!("{} / {}", a, b);
        prop_assert_eq!(evaluate_expression(&source), Node::Float(a as f64 / b as f64));
    }
}
