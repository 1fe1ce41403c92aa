use proptest::prelude::*;
use proptest::sample::Index;

/// A generated workflow graph: `(step id, dependency ids)` per step
pub type Graph = Vec<(String, Vec<String>)>;

fn step_name(index: usize) -> String {
    format!("s{index}")
}

/// Strategy for acyclic graphs of 1..=12 steps. A step only ever depends on steps
/// with a lower index, which rules out cycles.
pub fn acyclic_graph_strategy() -> impl Strategy<Value = Graph> {
    (1usize..=12).prop_flat_map(|size| {
        prop::collection::vec(prop::collection::vec(any::<Index>(), 0..3), size).prop_map(
            |picks| {
                picks
                    .into_iter()
                    .enumerate()
                    .map(|(index, picks)| {
                        let mut dependencies: Vec<String> = if index == 0 {
                            Vec::new()
                        } else {
                            picks.iter().map(|pick| step_name(pick.index(index))).collect()
                        };
                        dependencies.sort();
                        dependencies.dedup();
                        (step_name(index), dependencies)
                    })
                    .collect()
            },
        )
    })
}

/// Strategy for graphs that contain at least one cycle: an acyclic graph of two or
/// more steps whose first and last steps are made to depend on each other
pub fn cyclic_graph_strategy() -> impl Strategy<Value = Graph> {
    acyclic_graph_strategy()
        .prop_filter("needs at least two steps", |graph| graph.len() >= 2)
        .prop_map(|mut graph| {
            let last = graph.len() - 1;
            let last_id = graph[last].0.clone();
            let first_id = graph[0].0.clone();
            graph[0].1.push(last_id);
            if !graph[last].1.contains(&first_id) {
                graph[last].1.push(first_id);
            }
            graph
        })
}
