//! Integration tests for the GPU-offload detection pipeline.

use gpuopt::patterns::gpu::{GpuPatternDetector, VarRole};
use gpuopt::prelude::*;
use pretty_assertions::assert_eq;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn span(a: u32, b: u32) -> LineSpan {
    LineSpan::new(LineId::new(1, a), LineId::new(1, b))
}

fn at(l: u32) -> LineId {
    LineId::new(1, l)
}

/// ```c
/// void f(double *A, int n) {       // 1-20
///   for (i = 0; i < n; i++)        // L1: 2-8
///     for (j = 0; j < 100; j++)    // L2: 3-7
///       A[j] = j * 2.0;            // 4
///   use(A[0]);                     // 10 (optional)
/// }
/// ```
fn make_scenario(read_after: bool) -> PetGraph {
    let a = Variable::new("A", "double*");
    let i = Variable::new("i", "int");
    let j = Variable::new("j", "int");
    let n = Variable::new("n", "int");

    let mut g = PetGraph::new();
    let f = g.add_node(Node::function(NodeId::new(1), "f", span(1, 20))).unwrap();
    let l1 = g
        .add_node_under(
            f,
            Node::loop_node(NodeId::new(2), "L1", span(2, 8)).with_accesses([
                Access::write(i.clone(), at(2)),
                Access::read(i.clone(), at(2)),
                Access::read(n, at(2)),
            ]),
        )
        .unwrap();
    let l2 = g
        .add_node_under(
            l1,
            Node::loop_node(NodeId::new(3), "L2", span(3, 7))
                .with_loop_data(LoopData::new(100, 1000, 10))
                .with_accesses([Access::write(j.clone(), at(3)), Access::read(j.clone(), at(3))]),
        )
        .unwrap();
    g.add_node_under(
        l2,
        Node::cu(NodeId::new(4), span(4, 4), 3)
            .with_accesses([Access::read(j, at(4)), Access::write(a.clone(), at(4))]),
    )
    .unwrap();
    if read_after {
        g.add_node_under(
            f,
            Node::cu(NodeId::new(5), span(10, 10), 2).with_access(Access::read(a, at(10))),
        )
        .unwrap();
    }
    g
}

/// ```c
/// void f(double *A, int n) {       // 1-20
///   for (i = 0; i < n; i++)        // L1: 2-8
///     for (j = 0; j < 100; j++) {  // L2: 3-7
///       A[j] = i;                  // 4
///       last = j;                  // 5
///     }
///   print(last);                   // 10
/// }
/// ```
fn make_last_value_scenario() -> PetGraph {
    let a = Variable::new("A", "double*");
    let i = Variable::new("i", "int");
    let j = Variable::new("j", "int");
    let n = Variable::new("n", "int");
    let last = Variable::new("last", "int");

    let mut g = PetGraph::new();
    let f = g.add_node(Node::function(NodeId::new(1), "f", span(1, 20))).unwrap();
    let l1 = g
        .add_node_under(
            f,
            Node::loop_node(NodeId::new(2), "L1", span(2, 8)).with_accesses([
                Access::write(i.clone(), at(2)),
                Access::read(i.clone(), at(2)),
                Access::read(n, at(2)),
            ]),
        )
        .unwrap();
    let l2 = g
        .add_node_under(
            l1,
            Node::loop_node(NodeId::new(3), "L2", span(3, 7))
                .with_loop_data(LoopData::new(100, 1000, 10))
                .with_accesses([Access::write(j.clone(), at(3)), Access::read(j.clone(), at(3))]),
        )
        .unwrap();
    g.add_node_under(
        l2,
        Node::cu(NodeId::new(4), span(4, 5), 3).with_accesses([
            Access::read(i, at(4)),
            Access::read(j.clone(), at(4)),
            Access::write(a, at(4)),
            Access::read(j, at(5)),
            Access::write(last.clone(), at(5)),
        ]),
    )
    .unwrap();
    g.add_node_under(
        f,
        Node::cu(NodeId::new(5), span(10, 10), 1).with_access(Access::read(last, at(10))),
    )
    .unwrap();
    g
}

fn inner_do_all() -> DetectionResult {
    DetectionResult {
        do_all: vec![DoAllInfo::new(NodeId::new(3))],
        reduction: vec![],
    }
}

#[test]
fn test_single_inner_candidate() {
    init_logger();
    let g = make_scenario(false);
    let infos = gpuopt::run_detection(&g, &inner_do_all(), "/proj").unwrap();

    assert_eq!(infos.len(), 1);
    let region = &infos[0];
    assert_eq!(region.contained_loops, vec![NodeId::new(3)]);
    assert_eq!(region.node_id(), NodeId::new(3));
    assert_eq!(region.pattern().iterations_count, 1000);
    assert_eq!(region.pattern().average_iteration_count, 100);
    assert_eq!(region.pattern().entries, 10);
    assert_eq!(region.data_mapping.get("A"), Some(&MapDirection::From));
}

#[test]
fn test_array_read_after_region_still_from() {
    init_logger();
    let g = make_scenario(true);
    let infos = gpuopt::run_detection(&g, &inner_do_all(), "/proj").unwrap();
    assert_eq!(infos[0].data_mapping.get("A"), Some(&MapDirection::From));
}

#[test]
fn test_empty_detection_result() {
    init_logger();
    let g = make_scenario(false);
    let infos = gpuopt::run_detection(&g, &DetectionResult::new(), "/proj").unwrap();
    assert!(infos.is_empty());
}

#[test]
fn test_outer_without_statistics() {
    init_logger();
    let g = make_scenario(false);
    let res = DetectionResult {
        do_all: vec![DoAllInfo::new(NodeId::new(2)), DoAllInfo::new(NodeId::new(3))],
        reduction: vec![],
    };
    let infos = gpuopt::run_detection(&g, &res, "/proj").unwrap();

    assert_eq!(infos.len(), 1);
    let region = &infos[0];
    assert_eq!(region.contained_loops, vec![NodeId::new(2), NodeId::new(3)]);
    assert_eq!(region.pattern().iterations_count, -1);
    assert_eq!(region.pattern().entries, -1);
    // no statistics on L1, so the nest is not collapsed
    assert_eq!(region.loops.len(), 2);
    assert!(region.loops[0].pragma.starts_with("#pragma omp target teams distribute parallel for"));
    assert!(region.loops[1].pragma.starts_with("#pragma omp parallel for"));
}

#[test]
fn test_last_private_loop_is_skipped() {
    init_logger();
    let g = make_scenario(false);
    let res = DetectionResult {
        do_all: vec![DoAllInfo::new(NodeId::new(3))
            .with_last_private(vec![Variable::new("j", "int")])],
        reduction: vec![],
    };
    assert!(gpuopt::run_detection(&g, &res, "/proj").unwrap().is_empty());
}

#[test]
fn test_unknown_loop_is_error() {
    init_logger();
    let g = make_scenario(false);
    let res = DetectionResult {
        do_all: vec![DoAllInfo::new(NodeId::new(42))],
        reduction: vec![],
    };
    let err = gpuopt::run_detection(&g, &res, "/proj").unwrap_err();
    let root = err.root_cause().to_string();
    assert!(root.contains("n42"), "{}", root);
}

/// ```c
/// double dot(double *x, double *y, int n) {  // 1-12
///   double sum = 0;                           // 2
///   for (k = 0; k < n; k++)                   // 3-5
///     sum += x[k] * y[k];                     // 4
///   return sum;                               // 7
/// }
/// ```
fn make_dot() -> PetGraph {
    let x = Variable::new("x", "double*");
    let y = Variable::new("y", "double*");
    let k = Variable::new("k", "int");
    let n = Variable::new("n", "int");
    let sum = Variable::new("sum", "double").with_def_line(at(2));

    let mut g = PetGraph::new();
    let f = g.add_node(Node::function(NodeId::new(1), "dot", span(1, 12))).unwrap();
    g.add_node_under(
        f,
        Node::cu(NodeId::new(2), span(2, 2), 1).with_access(Access::write(sum.clone(), at(2))),
    )
    .unwrap();
    let l = g
        .add_node_under(
            f,
            Node::loop_node(NodeId::new(3), "k", span(3, 5))
                .with_loop_data(LoopData::new(64, 64, 1))
                .with_accesses([
                    Access::write(k.clone(), at(3)),
                    Access::read(k.clone(), at(3)),
                    Access::read(n, at(3)),
                ]),
        )
        .unwrap();
    g.add_node_under(
        l,
        Node::cu(NodeId::new(4), span(4, 4), 4).with_accesses([
            Access::read(x, at(4)),
            Access::read(k.clone(), at(4)),
            Access::read(y, at(4)),
            Access::read(k, at(4)),
            Access::read(sum.clone(), at(4)),
            Access::write(sum.clone(), at(4)),
        ]),
    )
    .unwrap();
    g.add_node_under(
        f,
        Node::cu(NodeId::new(5), span(7, 7), 1).with_access(Access::read(sum, at(7))),
    )
    .unwrap();
    g
}

#[test]
fn test_reduction_region() {
    init_logger();
    let g = make_dot();
    let res = DetectionResult {
        do_all: vec![],
        reduction: vec![ReductionInfo::new(
            NodeId::new(3),
            vec![Variable::new("sum", "double").with_operation("+")],
        )],
    };
    let infos = gpuopt::run_detection(&g, &res, "/proj").unwrap();
    let region = &infos[0];

    assert_eq!(region.data_mapping.get("sum"), Some(&MapDirection::ToFrom));
    assert_eq!(region.data_mapping.get("x"), Some(&MapDirection::To));
    assert_eq!(region.data_mapping.get("n"), Some(&MapDirection::To));
    assert!(region.data_mapping.get("k").is_none());
    assert_eq!(
        region.loops[0].pragma,
        "#pragma omp target teams distribute parallel for private(k) reduction(+:sum)"
    );
    assert_eq!(
        region.data_directive.as_deref(),
        Some("#pragma omp target data map(to: n,x,y) map(tofrom: sum)")
    );
}

#[test]
fn test_loop_roles_through_detector_stages() {
    use gpuopt::patterns::gpu::{select_candidates, GpuLoopPattern};

    let g = make_dot();
    let res = DetectionResult {
        do_all: vec![DoAllInfo::new(NodeId::new(3))],
        reduction: vec![],
    };
    let candidates = select_candidates(&g, &res).unwrap();
    let mut pattern = GpuLoopPattern::new(&g, &candidates[0], "/proj").unwrap();
    pattern.classify_loop_vars(&g).unwrap();
    // without a reduction record, sum is read first and therefore shared
    assert_eq!(pattern.role("sum"), Some(VarRole::Shared));
    assert_eq!(pattern.role("k"), Some(VarRole::Private));
}

#[test]
fn test_json_round_trip_pipeline() {
    init_logger();
    let graph_json = r#"{
        "nodes": [
            {"id": 1, "name": "main", "start_line": "1:1", "end_line": "1:30", "type": "function"},
            {"id": 2, "name": "L", "start_line": "1:3", "end_line": "1:6", "type": "loop",
             "loop_data": {
                "average_iteration_count": 32,
                "total_iteration_count": 32,
                "entry_count": 1
             },
             "accesses": [
                {"variable": {"name": "i", "type": "int"}, "kind": "write", "line": "1:3"},
                {"variable": {"name": "i", "type": "int"}, "kind": "read", "line": "1:3"}
             ]},
            {"id": 3, "start_line": "1:4", "end_line": "1:4", "type": "cu", "instructions": 5,
             "accesses": [
                {"variable": {"name": "g", "type": "int", "scope": "global"},
                 "kind": "write", "line": "1:4"},
                {"variable": {"name": "v", "type": "float*"}, "kind": "read", "line": "1:4"}
             ]}
        ],
        "children": [[1, 2], [2, 3]]
    }"#;
    let patterns_json = r#"{"do_all": [{"node_id": 2}]}"#;

    let graph = PetGraph::from_json(graph_json).unwrap();
    let res = DetectionResult::from_json(patterns_json).unwrap();
    let infos = gpuopt::run_detection(&graph, &res, "/proj").unwrap();
    assert_eq!(infos.len(), 1);

    let json: serde_json::Value = serde_json::from_str(&infos[0].to_json().unwrap()).unwrap();
    assert_eq!(json["node_id"], 2);
    assert_eq!(json["start_line"], "1:3");
    assert_eq!(json["iterations_count"], 32);
    assert_eq!(json["project_path"], "/proj");
    assert_eq!(json["data_mapping"]["g"], "from");
    assert_eq!(json["data_mapping"]["v"], "to");
    assert!(json["instructions_count"].is_null());
    // 32 iterations of (5 instructions + 2 header accesses)
    assert_eq!(json["workload"], 224);

    // the serialized graph yields the same result
    let reparsed = PetGraph::from_json(&graph.to_json().unwrap()).unwrap();
    let again = gpuopt::run_detection(&reparsed, &res, "/proj").unwrap();
    assert_eq!(again[0].to_json().unwrap(), infos[0].to_json().unwrap());
}

/// Three sibling loops; a statement with side effects sits between the
/// second and the third.
fn make_siblings() -> PetGraph {
    let mut g = PetGraph::new();
    let f = g.add_node(Node::function(NodeId::new(1), "main", span(1, 40))).unwrap();
    let bodies = [(10u64, 2u32, "P"), (20, 6, "Q"), (30, 14, "R")];
    for (id, line, array) in bodies {
        let l = g
            .add_node_under(
                f,
                Node::loop_node(NodeId::new(id), format!("L{}", id), span(line, line + 2)),
            )
            .unwrap();
        g.add_node_under(
            l,
            Node::cu(NodeId::new(id + 1), span(line + 1, line + 1), 2)
                .with_access(Access::write(Variable::new(array, "int*"), at(line + 1))),
        )
        .unwrap();
    }
    g.add_node_under(f, Node::cu(NodeId::new(40), span(9, 9), 1)).unwrap();
    g.add_node_under(
        f,
        Node::cu(NodeId::new(41), span(11, 11), 1)
            .with_access(Access::write(Variable::new("t", "int"), at(11))),
    )
    .unwrap();
    g
}

#[test]
fn test_sibling_merging_and_candidate_order() {
    init_logger();
    let g = make_siblings();
    let forward = DetectionResult {
        do_all: [10, 20, 30].into_iter().map(|i| DoAllInfo::new(NodeId::new(i))).collect(),
        reduction: vec![],
    };
    let backward = DetectionResult {
        do_all: [30, 20, 10].into_iter().map(|i| DoAllInfo::new(NodeId::new(i))).collect(),
        reduction: vec![],
    };

    let a = gpuopt::run_detection(&g, &forward, "").unwrap();
    let b = gpuopt::run_detection(&g, &backward, "").unwrap();

    let groups: Vec<Vec<NodeId>> = a.iter().map(|r| r.contained_loops.clone()).collect();
    assert_eq!(
        groups,
        vec![vec![NodeId::new(10), NodeId::new(20)], vec![NodeId::new(30)]]
    );
    assert_eq!(a[0].pattern().start_line, at(2));
    assert_eq!(a[0].pattern().end_line, at(8));

    let a_json: Vec<String> = a.iter().map(|r| r.to_json().unwrap()).collect();
    let b_json: Vec<String> = b.iter().map(|r| r.to_json().unwrap()).collect();
    assert_eq!(a_json, b_json);
}

#[test]
fn test_conservative_keeps_siblings_apart() {
    init_logger();
    let g = make_siblings();
    let res = DetectionResult {
        do_all: [10, 20, 30].into_iter().map(|i| DoAllInfo::new(NodeId::new(i))).collect(),
        reduction: vec![],
    };
    let infos = GpuPatternDetector::new(DetectorConfig::conservative())
        .run(&g, &res, "")
        .unwrap();
    assert_eq!(infos.len(), 3);
}

#[test]
fn test_last_value_copied_out() {
    init_logger();
    let g = make_last_value_scenario();
    let infos = gpuopt::run_detection(&g, &inner_do_all(), "/proj").unwrap();

    assert_eq!(infos.len(), 1);
    let region = &infos[0];
    assert_eq!(region.data_mapping.get("last"), Some(&MapDirection::From));
    assert_eq!(region.data_mapping.get("i"), Some(&MapDirection::To));
    assert_eq!(region.data_mapping.get("A"), Some(&MapDirection::From));
    assert_eq!(
        region.loops[0].pragma,
        "#pragma omp target teams distribute parallel for private(j) lastprivate(last)"
    );
    assert_eq!(
        region.data_directive.as_deref(),
        Some("#pragma omp target data map(to: i) map(from: A,last)")
    );
}

#[test]
fn test_last_value_in_outer_region() {
    init_logger();
    let g = make_last_value_scenario();
    let res = DetectionResult {
        do_all: vec![DoAllInfo::new(NodeId::new(2)), DoAllInfo::new(NodeId::new(3))],
        reduction: vec![],
    };
    let infos = gpuopt::run_detection(&g, &res, "/proj").unwrap();

    assert_eq!(infos.len(), 1);
    let region = &infos[0];
    assert_eq!(
        region.loops[0].pragma,
        "#pragma omp target teams distribute parallel for private(i,j) lastprivate(last)"
    );
    assert_eq!(
        region.data_directive.as_deref(),
        Some("#pragma omp target data map(to: n) map(from: A,last)")
    );
}
