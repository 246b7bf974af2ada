use lineage_graph::config::CacheSettings;
use lineage_graph::lineage::{
    DepthWalker, GenerationPolicy, GraphCompactor, GroupingOptions, JsonFileFetcher, LayoutOptions, LineageCache,
    LineageOptions, LineageResult,
};
use lineage_graph::types::{FilterValue, LineageDirection, LineageFilter, Node};
use proptest::prelude::*;
use std::collections::BTreeSet;

const TYPES: [&str; 3] = ["Sample", "Data", "ExperimentRun"];

/// Random DAG on `n0..nN` with edges only from lower to higher index, seeded at `n0`
fn arb_lineage() -> impl Strategy<Value = LineageResult> {
    (1usize..12)
        .prop_flat_map(|n| {
            (
                Just(n),
                prop::collection::vec(0..TYPES.len(), n),
                prop::collection::vec((0..n, 0..n), 0..n * 3),
            )
        })
        .prop_map(|(n, types, pairs)| {
            let mut nodes: Vec<Node> = (0..n).map(|i| Node::new(format!("n{i}"), TYPES[types[i]])).collect();
            let edges: BTreeSet<(usize, usize)> = pairs.into_iter().filter(|(a, b)| a < b).collect();
            for (parent, child) in edges {
                nodes[parent] = nodes[parent].clone().with_child(format!("n{child}"));
                nodes[child] = nodes[child].clone().with_parent(format!("n{parent}"));
            }
            LineageResult::new("n0", nodes).unwrap()
        })
}

fn arb_type_filter() -> impl Strategy<Value = FilterValue> {
    prop_oneof![
        Just(FilterValue::Any),
        (0..TYPES.len()).prop_map(|i| FilterValue::from(TYPES[i])),
        Just(FilterValue::OneOf(vec![
            serde_json::json!("Sample"),
            serde_json::json!("Data")
        ])),
    ]
}

fn arb_grouping() -> impl Strategy<Value = GroupingOptions> {
    (
        prop_oneof![
            Just(GenerationPolicy::Nearest),
            Just(GenerationPolicy::Specific),
            Just(GenerationPolicy::Multi),
            Just(GenerationPolicy::All),
        ],
        0usize..4,
        0usize..4,
        prop_oneof![Just(None), (2usize..5).prop_map(Some)],
    )
        .prop_map(|(generations, parent_depth, child_depth, combine_size)| GroupingOptions {
            generations,
            parent_depth,
            child_depth,
            combine_size,
        })
}

proptest! {
    #[test]
    fn filtering_is_idempotent(result in arb_lineage(), value in arb_type_filter(), keep in any::<bool>()) {
        let filter = |r: &LineageResult| if keep {
            r.filter_in("type", &value).unwrap()
        } else {
            r.filter_out("type", &value).unwrap()
        };
        let once = filter(&result);
        let twice = filter(&once);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn filter_in_and_out_partition_nodes(result in arb_lineage(), value in arb_type_filter()) {
        let kept = result.filter_in("type", &value).unwrap();
        let dropped = result.filter_out("type", &value).unwrap();

        let kept_ids: BTreeSet<&String> = kept.nodes.keys().collect();
        let dropped_ids: BTreeSet<&String> = dropped.nodes.keys().collect();
        prop_assert!(kept_ids.is_disjoint(&dropped_ids));
        prop_assert_eq!(kept_ids.len() + dropped_ids.len(), result.len());
    }

    #[test]
    fn filtered_edges_stay_inside_result(result in arb_lineage(), value in arb_type_filter()) {
        let filtered = result.filter_out("type", &value).unwrap();
        prop_assert!(filtered.validate().is_ok());

        for node in filtered.nodes.values() {
            for direction in LineageDirection::both() {
                prop_assert!(node.edges(direction).iter().all(|e| e.target != node.id));
            }
        }
    }

    #[test]
    fn merge_keys_are_symmetric(a in arb_lineage(), b in arb_lineage()) {
        let ab = a.merge_lineage(&b);
        let ba = b.merge_lineage(&a);

        prop_assert!(ab.validate().is_ok());
        prop_assert_eq!(
            ab.nodes.keys().collect::<Vec<_>>(),
            ba.nodes.keys().collect::<Vec<_>>()
        );
    }

    #[test]
    fn compacted_edges_connect_rendered_nodes(result in arb_lineage(), grouping in arb_grouping()) {
        let graph = GraphCompactor::new(grouping, LayoutOptions::default()).compact(&result).unwrap();

        let ids: BTreeSet<&str> = graph.nodes.iter().map(|n| n.id()).collect();
        prop_assert_eq!(ids.len(), graph.nodes.len());
        for edge in &graph.edges {
            prop_assert!(ids.contains(edge.from.as_str()), "dangling from {}", edge.id);
            prop_assert!(ids.contains(edge.to.as_str()), "dangling to {}", edge.id);
            prop_assert_ne!(&edge.from, &edge.to);
        }
        prop_assert_eq!(graph.initial_selection, vec!["n0".to_string()]);
    }

    #[test]
    fn walk_respects_max_distance(result in arb_lineage(), max_distance in 0usize..5) {
        for direction in LineageDirection::both() {
            let list = DepthWalker::get_depth_first_node_list(&result.nodes, "n0", direction, max_distance).unwrap();

            prop_assert_eq!(list[0].node.id.as_str(), "n0");
            prop_assert_eq!(list[0].distance, 0);
            prop_assert!(list.iter().all(|n| n.distance <= max_distance));
        }
    }
}

#[test]
fn file_source_through_cache_to_graph() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let payload = serde_json::json!({
        "seed": "S",
        "nodes": {
            "S": { "name": "Blood 1", "type": "Sample", "children": [{ "lsid": "R" }] },
            "R": {
                "type": "ExperimentRun",
                "parents": [{ "lsid": "S" }],
                "children": [{ "lsid": "D1" }, { "lsid": "D2" }, { "lsid": "D3" }, { "lsid": "beyond" }]
            },
            "D1": { "type": "Data", "parents": [{ "lsid": "R" }] },
            "D2": { "type": "Data", "parents": [{ "lsid": "R" }] },
            "D3": { "type": "Data", "parents": [{ "lsid": "R" }] }
        }
    });
    std::fs::write(temp_dir.path().join("S.json"), payload.to_string()).unwrap();

    let cache = LineageCache::new(&CacheSettings::default()).unwrap();
    let fetcher = JsonFileFetcher::new(temp_dir.path());
    let lineage = tokio_test::block_on(cache.load("S", 5, &fetcher));
    assert!(lineage.is_loaded());

    let options = LineageOptions {
        filters: vec![LineageFilter::new("type", "ExperimentRun")],
        filter_in: false,
        grouping: GroupingOptions {
            generations: GenerationPolicy::All,
            combine_size: Some(3),
            ..Default::default()
        },
        ..Default::default()
    };
    let graph = lineage.generate_graph(&options).unwrap();

    assert_eq!(graph.nodes.len(), 2);
    assert_eq!(graph.combined_nodes().next().unwrap().label, "3 items of type Data");
    assert_eq!(graph.edges.len(), 1);
}
