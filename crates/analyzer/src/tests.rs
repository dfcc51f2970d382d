use super::*;
use catalog::LookupPredicate;
use common::{Column, DbError, ExecutionContext, Row, Schema};
use expr::{BinaryOp, Expr, join_and, split_conjunction};
use plan::{IndexableTable, RowIter, Table};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::{
    ops::Bound,
    sync::atomic::{AtomicUsize, Ordering},
};
use testsupport::{
    prelude::*,
    proptest_generators::{arb_conjuncts, arb_single_table_conjunct},
};
use types::{SqlType, Value};

fn filters_only() -> Capabilities {
    Capabilities {
        filters: true,
        ..Capabilities::default()
    }
}

fn projection_only() -> Capabilities {
    Capabilities {
        projection: true,
        ..Capabilities::default()
    }
}

fn no_indexes() -> Analyzer {
    Analyzer::new(Arc::new(Catalog::new()))
}

fn indexed() -> (Arc<Catalog>, Analyzer) {
    let catalog = Arc::new(sample_catalog());
    let analyzer = Analyzer::new(Arc::clone(&catalog));
    (catalog, analyzer)
}

fn conjuncts_of(node: &Node) -> Vec<Expr> {
    filter_predicates(node)
        .iter()
        .flat_map(split_conjunction)
        .collect()
}

/// Counts how often it is asked for an assignment; never proposes anything.
#[derive(Clone, Default)]
struct CountingAssigner {
    calls: Arc<AtomicUsize>,
}

impl IndexAssigner for CountingAssigner {
    fn assign(&self, _node: &Node) -> DbResult<IndexAssignment> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(IndexAssignment::new())
    }
}

struct FailingAssigner;

impl IndexAssigner for FailingAssigner {
    fn assign(&self, _node: &Node) -> DbResult<IndexAssignment> {
        Err(DbError::Index("index provider unavailable".into()))
    }
}

/// Index-accepting table named `t` that cannot start a scan.
#[derive(Clone, Debug)]
struct OfflineTable;

impl fmt::Display for OfflineTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("offline t")
    }
}

impl Table for OfflineTable {
    fn name(&self) -> &str {
        "t"
    }

    fn schema(&self) -> Schema {
        T_COLUMNS
            .iter()
            .map(|c| Column::new(*c, "t", SqlType::Int))
            .collect()
    }

    fn row_iter(&self, _ctx: &ExecutionContext) -> DbResult<Box<dyn RowIter>> {
        Err(DbError::Table("t is offline".into()))
    }

    fn as_indexable(&self) -> Option<&dyn IndexableTable> {
        Some(self)
    }
}

impl IndexableTable for OfflineTable {
    fn with_index_lookup(&self, _lookup: catalog::IndexLookup) -> DbResult<Arc<dyn Table>> {
        Ok(Arc::new(self.clone()))
    }
}

// Column usage and filter collection

#[test]
fn column_usage_is_first_occurrence_per_table() {
    let plan = Node::project(
        vec![joined_col("u", "d"), joined_col("t", "c")],
        filter(
            and(
                eq(joined_col("t", "a"), lit(1)),
                eq(joined_col("t", "c"), joined_col("u", "b")),
            ),
            Node::cross_join(t_scan(Capabilities::default()), u_scan(Capabilities::default())),
        ),
    );
    let usage = ColumnUsage::collect(&plan);
    assert_eq!(usage.table_count(), 2);
    assert_eq!(
        usage.columns("t"),
        Some(&["c".to_string(), "a".to_string()][..])
    );
    assert_eq!(
        usage.columns("u"),
        Some(&["d".to_string(), "b".to_string()][..])
    );
    assert_eq!(usage.columns("v"), None);
}

#[test]
fn table_filters_group_single_table_conjuncts() {
    let t_a = eq(joined_col("t", "a"), lit(1));
    let u_d = cmp(joined_col("u", "d"), BinaryOp::Gt, lit(5));
    let cross = eq(joined_col("t", "b"), joined_col("u", "b"));
    let constant = Expr::literal(true);
    let predicate = and(and(t_a.clone(), cross), and(u_d.clone(), constant));

    let filters = TableFilters::from_predicate(&predicate);
    assert_eq!(filters.table_count(), 2);
    assert_eq!(filters.for_table("t"), &[t_a.clone()]);
    assert_eq!(filters.for_table("u"), &[u_d]);
    assert!(filters.for_table("v").is_empty());

    let mut merged = filters.clone();
    merged.merge(TableFilters::from_predicate(&t_a));
    assert_eq!(merged.for_table("t").len(), 2);
}

#[test]
fn table_filters_collect_from_every_filter_node() {
    let plan = filter(
        eq(t_col("a"), lit(1)),
        filter(eq(t_col("b"), lit(10)), t_scan(Capabilities::default())),
    );
    let filters = TableFilters::collect(&plan);
    assert_eq!(
        filters.for_table("t"),
        &[eq(t_col("a"), lit(1)), eq(t_col("b"), lit(10))]
    );
}

#[test]
fn unhandled_filters_keep_order() {
    let a = eq(t_col("a"), lit(1));
    let b = eq(t_col("b"), lit(2));
    let c = eq(t_col("c"), lit(3));
    assert_eq!(
        unhandled_filters(vec![a.clone(), b.clone(), c.clone()], &[b]),
        vec![a, c]
    );
}

// Field index fixup

#[test]
fn fixup_matches_name_and_source() {
    let schema: Schema = vec![
        Column::new("c", "t", SqlType::Int),
        Column::new("a", "u", SqlType::Int),
        Column::new("a", "t", SqlType::Int),
    ]
    .into_iter()
    .collect();
    let fixed = fix_field_indexes(&schema, eq(field(0, "t", "a"), field(9, "t", "c"))).unwrap();
    assert_eq!(fixed, eq(field(2, "t", "a"), field(0, "t", "c")));

    let err = fix_field_indexes(&schema, field(0, "t", "b")).unwrap_err();
    assert_eq!(err, DbError::FieldMissing("b".into()));
}

#[test]
fn fixup_on_expressions_fails_as_a_whole() {
    let schema = t_table(Capabilities::default()).base_schema().clone();
    let fixed =
        fix_field_indexes_on_expressions(&schema, vec![field(7, "t", "c"), field(7, "t", "a")])
            .unwrap();
    assert_eq!(fixed, vec![t_col("c"), t_col("a")]);
    assert!(
        fix_field_indexes_on_expressions(&schema, vec![t_col("a"), field(0, "u", "d")])
            .unwrap_err()
            .is_field_missing()
    );
}

#[test]
fn fixup_any_takes_first_schema_that_resolves() {
    let t = t_table(Capabilities::default()).base_schema().clone();
    let u = u_table(Capabilities::default()).base_schema().clone();
    let schemas = [t, u];

    let fixed = fix_field_indexes_any(&schemas, joined_col("u", "d")).unwrap();
    assert_eq!(fixed, u_col("d"));

    let fixed = fix_field_indexes_any(&schemas, joined_col("t", "c")).unwrap();
    assert_eq!(fixed, t_col("c"));

    let both = eq(joined_col("t", "a"), joined_col("u", "d"));
    assert!(fix_field_indexes_any(&schemas, both).unwrap_err().is_field_missing());
    assert!(fix_field_indexes_any(&[], t_col("a")).unwrap_err().is_field_missing());
}

// Index assignment

#[test]
fn catalog_assigner_proposes_equality_and_range_lookups() {
    let catalog = Arc::new(sample_catalog());
    let assigner = CatalogIndexAssigner::new(Arc::clone(&catalog));
    let plan = filter(
        and(
            cmp(lit(5), BinaryOp::Gt, joined_col("t", "a")),
            eq(joined_col("u", "b"), lit(20)),
        ),
        Node::cross_join(t_scan(Capabilities::all()), u_scan(Capabilities::all())),
    );

    let assignment = assigner.assign(&plan).unwrap();
    assert_eq!(assignment.len(), 2);
    assert_eq!(catalog.handles_in_use(), 2);

    let t = assignment.get("t").unwrap();
    assert_eq!(t.lookup.index_name, "idx_t_a");
    assert_eq!(
        t.lookup.predicate,
        LookupPredicate::Range {
            low: Bound::Unbounded,
            high: Bound::Excluded(Value::Int(5)),
        }
    );
    let u = assignment.get("u").unwrap();
    assert_eq!(u.lookup.to_string(), "idx_u_b(b = 20)");

    for handle in assignment.into_handles() {
        catalog.release_index(handle);
    }
    assert_all_released(&catalog);
}

#[test]
fn catalog_assigner_skips_unusable_conjuncts() {
    let catalog = Arc::new(sample_catalog());
    let assigner = CatalogIndexAssigner::new(Arc::clone(&catalog));
    let plan = filter(
        join_and(vec![
            // hash index cannot answer a range
            cmp(t_col("c"), BinaryOp::Ge, lit(100)),
            cmp(t_col("a"), BinaryOp::Ne, lit(1)),
            eq(t_col("b"), lit(10)),
            eq(t_col("a"), Expr::literal(Value::Null)),
            eq(t_col("a"), t_col("c")),
        ])
        .unwrap(),
        t_scan(Capabilities::all()),
    );
    let assignment = assigner.assign(&plan).unwrap();
    assert!(assignment.is_empty());
    assert_all_released(&catalog);
}

#[test]
fn catalog_assigner_first_match_per_table_wins() {
    let catalog = Arc::new(sample_catalog());
    let assigner = CatalogIndexAssigner::new(Arc::clone(&catalog));
    let plan = filter(
        and(eq(t_col("c"), lit(100)), eq(t_col("a"), lit(1))),
        t_scan(Capabilities::all()),
    );
    let assignment = assigner.assign(&plan).unwrap();
    assert_eq!(assignment.len(), 1);
    assert!(assignment.contains("t"));
    assert_eq!(assignment.get("t").unwrap().lookup.index_name, "idx_t_c");
    assert_eq!(catalog.handles_in_use(), 1);
    for handle in assignment.into_handles() {
        catalog.release_index(handle);
    }
}

// Filter pushdown

#[test]
fn pushes_single_table_conjuncts_into_each_table() {
    let plan = filter(
        and(
            eq(joined_col("t", "a"), lit(1)),
            eq(joined_col("u", "b"), lit(20)),
        ),
        Node::cross_join(t_scan(filters_only()), u_scan(filters_only())),
    );
    let out = no_indexes().pushdown(plan).unwrap();

    assert_no_filters(&out);
    assert_eq!(table_description(&out, "t"), "t filters=[t.a = 1]");
    assert_eq!(table_description(&out, "u"), "u filters=[u.b = 20]");
    assert_eq!(run(&out), vec![int_row(&[1, 10, 100, 20, 2000])]);
}

#[test]
fn disjunction_across_tables_is_not_pushed() {
    let plan = filter(
        or(
            eq(joined_col("t", "a"), lit(1)),
            eq(joined_col("u", "b"), lit(20)),
        ),
        Node::cross_join(t_scan(filters_only()), u_scan(filters_only())),
    );
    let out = no_indexes().pushdown(plan.clone()).unwrap();
    assert_eq!(out, plan);
    assert_eq!(table_description(&out, "t"), "t");
}

#[test]
fn partially_handled_filter_keeps_the_rest() {
    let t = t_table(filters_only()).handling_columns(&["a"]).into_table();
    let plan = filter(
        and(eq(t_col("a"), lit(1)), eq(t_col("b"), lit(10))),
        Node::table(t),
    );
    let out = no_indexes().pushdown(plan).unwrap();

    assert_eq!(filter_predicates(&out), vec![eq(t_col("b"), lit(10))]);
    assert_eq!(table_description(&out, "t"), "t filters=[t.a = 1]");
    assert_eq!(run(&out), vec![int_row(&[1, 10, 100])]);
}

#[test]
fn filter_above_table_without_filter_capability_is_unchanged() {
    let predicate = and(
        eq(t_col("a"), lit(1)),
        and(eq(t_col("b"), lit(10)), eq(t_col("c"), lit(100))),
    );
    let plan = filter(predicate.clone(), t_scan(Capabilities::default()));
    let out = no_indexes().pushdown(plan.clone()).unwrap();
    assert_eq!(out, plan);
}

#[test]
fn untouched_filter_keeps_its_shape_when_other_tables_handle_filters() {
    let nested = and(
        eq(joined_col("t", "a"), lit(1)),
        and(eq(joined_col("t", "b"), lit(10)), eq(joined_col("t", "c"), lit(100))),
    );
    let plan = Node::cross_join(
        filter(eq(u_col("d"), lit(1000)), u_scan(filters_only())),
        filter(nested.clone(), t_scan(Capabilities::default())),
    );
    let out = no_indexes().pushdown(plan).unwrap();
    assert_eq!(filter_predicates(&out), vec![nested]);
    assert_eq!(table_description(&out, "u"), "u filters=[u.d = 1000]");
}

#[test]
fn nested_filters_are_both_consumed() {
    let plan = filter(
        eq(t_col("a"), lit(2)),
        filter(eq(t_col("b"), lit(20)), t_scan(filters_only())),
    );
    let out = no_indexes().pushdown(plan).unwrap();
    assert_no_filters(&out);
    assert_eq!(
        table_description(&out, "t"),
        "t filters=[t.a = 2, t.b = 20]"
    );
    assert_eq!(run(&out), vec![int_row(&[2, 20, 200])]);
}

// Projection pushdown

#[test]
fn projection_restricts_table_to_used_columns() {
    let plan = Node::project(
        vec![t_col("a"), t_col("c")],
        filter(eq(t_col("a"), lit(2)), t_scan(Capabilities::all())),
    );
    let out = no_indexes().pushdown(plan).unwrap();

    assert_no_filters(&out);
    let t = find_table(&out, "t").unwrap();
    assert_eq!(t.schema().to_string(), "[t.a, t.c]");
    assert_eq!(
        table_description(&out, "t"),
        "t filters=[t.a = 2] projection=[a, c]"
    );
    let Node::Project { projections, .. } = &out else {
        panic!("expected project at the root:\n{out}");
    };
    assert_eq!(projections, &vec![field(0, "t", "a"), field(1, "t", "c")]);
    assert_eq!(run(&out), vec![int_row(&[2, 200])]);
}

#[test]
fn pushed_filters_are_fixed_against_unpruned_schema() {
    // t.c lives at 2 in [a, b, c] but at 1 once the table is pruned to [a, c].
    let plan = Node::project(
        vec![t_col("a")],
        filter(eq(t_col("c"), lit(300)), t_scan(Capabilities::all())),
    );
    let out = no_indexes().pushdown(plan).unwrap();
    assert_eq!(
        table_description(&out, "t"),
        "t filters=[t.c = 300] projection=[a, c]"
    );
    assert_eq!(run(&out), vec![int_row(&[3])]);
}

#[test]
fn retained_filter_is_reindexed_after_pruning() {
    let plan = filter(eq(t_col("c"), lit(300)), t_scan(projection_only()));
    let out = no_indexes().pushdown(plan).unwrap();
    assert_eq!(filter_predicates(&out), vec![eq(field(0, "t", "c"), lit(300))]);
    assert_eq!(run(&out), vec![int_row(&[300])]);
}

#[test]
fn join_condition_is_fixed_against_combined_schema() {
    let plan = Node::project(
        vec![joined_col("t", "a"), joined_col("u", "d")],
        t_join_u(projection_only(), projection_only()),
    );
    let out = no_indexes().pushdown(plan).unwrap();

    let Node::Project { projections, child } = &out else {
        panic!("expected project at the root:\n{out}");
    };
    assert_eq!(child.schema().to_string(), "[t.a, t.b, u.d, u.b]");
    assert_eq!(projections, &vec![field(0, "t", "a"), field(2, "u", "d")]);
    let Node::InnerJoin { cond, .. } = &**child else {
        panic!("expected join under project:\n{out}");
    };
    assert_eq!(cond, &eq(field(1, "t", "b"), field(3, "u", "b")));
    assert_eq!(
        sorted_rows(&out),
        vec![int_row(&[1, 1000]), int_row(&[2, 2000])]
    );
}

#[test]
fn table_without_used_columns_keeps_its_shape() {
    let plan = t_scan(Capabilities::all());
    let out = no_indexes().pushdown(plan.clone()).unwrap();
    assert_eq!(out, plan);
    assert_eq!(run(&out).len(), 3);
}

#[test]
fn missing_field_in_projection_is_fatal() {
    let plan = Node::project(vec![field(0, "t", "zz")], t_scan(Capabilities::default()));
    let err = no_indexes().pushdown(plan).unwrap_err();
    assert_eq!(err, DbError::FieldMissing("zz".into()));
}

#[test]
fn filter_is_not_pushed_through_limit() {
    let plan = filter(eq(t_col("a"), lit(2)), Node::limit(1, t_scan(filters_only())));
    assert!(run(&plan).is_empty());

    let out = no_indexes().pushdown(plan).unwrap();
    assert_eq!(filter_predicates(&out), vec![eq(t_col("a"), lit(2))]);
    assert!(run(&out).is_empty());
}

#[test]
fn index_lookup_is_not_pushed_through_limit() {
    let (catalog, analyzer) = indexed();
    let caps = Capabilities {
        index: true,
        ..Capabilities::default()
    };
    let plan = filter(eq(t_col("a"), lit(2)), Node::limit(1, t_scan(caps)));
    assert!(run(&plan).is_empty());

    let out = analyzer.pushdown(plan).unwrap();
    assert!(!matches!(out, Node::Releaser(_)), "unexpected releaser:\n{out}");
    assert_all_released(&catalog);
    assert!(run(&out).is_empty());
}

#[test]
fn filter_below_limit_is_still_pushed() {
    let plan = filter(
        eq(t_col("c"), lit(300)),
        Node::limit(
            2,
            filter(cmp(t_col("a"), BinaryOp::Ge, lit(2)), t_scan(filters_only())),
        ),
    );
    let expected = run(&plan);
    assert_eq!(expected, vec![int_row(&[3, 30, 300])]);

    let out = no_indexes().pushdown(plan).unwrap();
    assert_eq!(filter_predicates(&out), vec![eq(t_col("c"), lit(300))]);
    assert_eq!(count_filters(&out), 1);
    assert_eq!(run(&out), expected);
}

// Index pushdown and release

#[test]
fn index_lookup_is_installed_and_released_after_execution() {
    let (catalog, analyzer) = indexed();
    let plan = filter(eq(t_col("a"), lit(1)), t_scan(Capabilities::all()));
    let out = analyzer.pushdown(plan).unwrap();

    assert!(matches!(out, Node::Releaser(_)), "expected releaser:\n{out}");
    assert_eq!(
        table_description(&out, "t"),
        "t filters=[t.a = 1] projection=[a] lookup=idx_t_a(a = 1)"
    );
    assert_eq!(catalog.handles_in_use(), 1);

    assert_eq!(run(&out), vec![int_row(&[1])]);
    assert_all_released(&catalog);
    drop(out);
    assert_all_released(&catalog);
}

#[test]
fn empty_result_then_close_releases_once() {
    let (catalog, analyzer) = indexed();
    let plan = filter(eq(t_col("a"), lit(99)), t_scan(Capabilities::all()));
    let out = analyzer.pushdown(plan).unwrap();

    let mut iter = out.row_iter(&ExecutionContext::default()).unwrap();
    assert_eq!(catalog.handles_in_use(), 1);
    assert_eq!(iter.next().unwrap(), None);
    iter.close().unwrap();
    assert_all_released(&catalog);
}

#[test]
fn early_close_releases() {
    let (catalog, analyzer) = indexed();
    let plan = filter(
        cmp(t_col("a"), BinaryOp::Ge, lit(1)),
        t_scan(Capabilities::all()),
    );
    let out = analyzer.pushdown(plan).unwrap();
    assert!(table_description(&out, "t").contains("lookup=idx_t_a(1 <= a)"));

    let mut iter = out.row_iter(&ExecutionContext::default()).unwrap();
    assert!(iter.next().unwrap().is_some());
    assert_eq!(catalog.handles_in_use(), 1);
    iter.close().unwrap();
    assert_all_released(&catalog);
}

#[test]
fn failure_to_start_releases() {
    let (catalog, analyzer) = indexed();
    let plan = filter(eq(t_col("a"), lit(1)), Node::table(Arc::new(OfflineTable)));
    let out = analyzer.pushdown(plan).unwrap();
    assert_eq!(catalog.handles_in_use(), 1);

    let err = out.row_iter(&ExecutionContext::default()).err();
    assert_eq!(err, Some(DbError::Table("t is offline".into())));
    assert_all_released(&catalog);
}

#[test]
fn unexecuted_plan_releases_when_dropped() {
    let (catalog, analyzer) = indexed();
    let out = analyzer
        .pushdown(filter(eq(t_col("a"), lit(1)), t_scan(Capabilities::all())))
        .unwrap();
    assert_eq!(catalog.handles_in_use(), 1);
    drop(out);
    assert_all_released(&catalog);
}

#[test]
fn handles_for_tables_without_index_capability_are_released() {
    let (catalog, analyzer) = indexed();
    let plan = filter(eq(t_col("a"), lit(1)), t_scan(filters_only()));
    let out = analyzer.pushdown(plan).unwrap();
    assert!(!matches!(out, Node::Releaser(_)));
    assert_eq!(table_description(&out, "t"), "t filters=[t.a = 1]");
    assert_all_released(&catalog);
}

#[test]
fn table_error_releases_installed_handles() {
    let (catalog, analyzer) = indexed();
    // t takes its lookup before projecting u fails on the unknown u.z.
    let plan = filter(
        and(eq(joined_col("t", "a"), lit(1)), eq(field(5, "u", "z"), lit(5))),
        Node::cross_join(t_scan(Capabilities::all()), u_scan(Capabilities::all())),
    );
    assert_error_contains(analyzer.pushdown(plan), "no column 'z'");
    assert_all_released(&catalog);
}

#[test]
fn table_error_releases_unclaimed_handles() {
    let (catalog, analyzer) = indexed();
    let plan = filter(
        and(eq(t_col("a"), lit(1)), eq(field(3, "t", "zz"), lit(5))),
        t_scan(Capabilities::all()),
    );
    assert_error_contains(analyzer.pushdown(plan), "no column 'zz'");
    assert_all_released(&catalog);
}

#[test]
fn assigner_error_aborts_the_pass() {
    let analyzer = no_indexes().with_index_assigner(FailingAssigner);
    let plan = filter(eq(t_col("a"), lit(1)), t_scan(Capabilities::all()));
    assert_error_contains(analyzer.pushdown(plan), "index provider unavailable");
}

#[test]
fn explain_after_full_pushdown() {
    let (catalog, analyzer) = indexed();
    let plan = Node::project(
        vec![joined_col("t", "a"), joined_col("u", "d")],
        filter(
            and(
                eq(joined_col("t", "a"), lit(1)),
                eq(joined_col("t", "b"), joined_col("u", "b")),
            ),
            Node::cross_join(t_scan(Capabilities::all()), u_scan(Capabilities::all())),
        ),
    );
    let out = analyzer.pushdown(plan).unwrap();
    insta::assert_snapshot!(out.to_string(), @r"
    Project [t.a, u.d]
      Filter [t.b = u.b]
        CrossJoin
          ResolvedTable t filters=[t.a = 1] projection=[a, b] lookup=idx_t_a(a = 1)
          ResolvedTable u projection=[d, b]
    ");
    assert_eq!(run(&out), vec![int_row(&[1, 1000])]);
    assert_all_released(&catalog);
}

// Configuration and skipped plans

#[test]
fn unresolved_plan_is_returned_untouched() {
    let assigner = CountingAssigner::default();
    let analyzer = no_indexes().with_index_assigner(assigner.clone());
    let plan = filter(eq(t_col("a"), lit(1)), Node::unresolved("t"));
    assert_eq!(analyzer.pushdown(plan.clone()).unwrap(), plan);
    assert_eq!(assigner.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn disabled_pass_changes_nothing() {
    let assigner = CountingAssigner::default();
    let analyzer = no_indexes()
        .with_config(Config::builder().pushdown_enabled(false).build())
        .with_index_assigner(assigner.clone());
    let plan = filter(eq(t_col("a"), lit(1)), t_scan(Capabilities::all()));
    assert_eq!(analyzer.pushdown(plan.clone()).unwrap(), plan);
    assert_eq!(assigner.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn disabled_dimensions_are_skipped() {
    let plan = || filter(eq(t_col("a"), lit(1)), t_scan(Capabilities::all()));

    let no_projection = no_indexes()
        .with_config(Config::builder().projection_pushdown(false).build())
        .pushdown(plan())
        .unwrap();
    assert_eq!(table_description(&no_projection, "t"), "t filters=[t.a = 1]");

    let no_filters = no_indexes()
        .with_config(Config::builder().filter_pushdown(false).build())
        .pushdown(plan())
        .unwrap();
    assert_eq!(table_description(&no_filters, "t"), "t projection=[a]");
    assert_eq!(count_filters(&no_filters), 1);
    assert_eq!(run(&no_filters), vec![int_row(&[1])]);

    let (catalog, analyzer) = indexed();
    let assigner = CountingAssigner::default();
    let analyzer = analyzer
        .with_config(Config::builder().index_pushdown(false).build())
        .with_index_assigner(assigner.clone());
    let no_index = analyzer.pushdown(plan()).unwrap();
    assert!(!matches!(no_index, Node::Releaser(_)));
    assert_eq!(assigner.calls.load(Ordering::SeqCst), 0);
    assert_all_released(&catalog);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_cross_table_conjuncts_stay_above(conjuncts in arb_conjuncts()) {
        let predicate = join_and(conjuncts.clone()).unwrap();
        let plan = filter(
            predicate,
            Node::cross_join(t_scan(filters_only()), u_scan(filters_only())),
        );
        let out = no_indexes().pushdown(plan.clone()).unwrap();

        let expected: Vec<Expr> = conjuncts
            .iter()
            .filter(|c| c.tables().len() > 1)
            .cloned()
            .collect();
        prop_assert_eq!(conjuncts_of(&out), expected);
        prop_assert_eq!(sorted_rows(&out), sorted_rows(&plan));
    }

    #[test]
    fn prop_split_then_join_preserves_rows(
        conjuncts in prop::collection::vec(arb_single_table_conjunct("t"), 1..5)
    ) {
        let predicate = join_and(conjuncts.clone()).unwrap();
        prop_assert_eq!(split_conjunction(&predicate), conjuncts);
        let rejoined = join_and(split_conjunction(&predicate)).unwrap();
        let original = filter(predicate, t_scan(Capabilities::default()));
        let rebuilt = filter(rejoined, t_scan(Capabilities::default()));
        prop_assert_eq!(sorted_rows(&original), sorted_rows(&rebuilt));
    }

    #[test]
    fn prop_projection_matches_usage(
        columns in prop::collection::vec(prop::sample::select(T_COLUMNS.to_vec()), 1..6)
    ) {
        let plan = Node::project(
            columns.iter().map(|c| t_col(c)).collect(),
            t_scan(projection_only()),
        );
        let out = no_indexes().pushdown(plan).unwrap();

        let mut expected: Vec<&str> = Vec::new();
        for c in &columns {
            if !expected.contains(c) {
                expected.push(*c);
            }
        }
        let t = find_table(&out, "t").unwrap();
        let schema = t.schema();
        prop_assert_eq!(schema.names(), expected);
        prop_assert_eq!(count_filters(&out), 0);
        prop_assert_eq!(run(&out).len(), 3);
    }

    #[test]
    fn prop_every_handle_released(
        value in 0i64..5,
        op in prop::sample::select(vec![BinaryOp::Eq, BinaryOp::Lt, BinaryOp::Ge]),
        stop_after in 0usize..4,
    ) {
        let (catalog, analyzer) = indexed();
        let plan = filter(cmp(t_col("a"), op, lit(value)), t_scan(Capabilities::all()));
        let out = analyzer.pushdown(plan).unwrap();
        prop_assert_eq!(catalog.handles_in_use(), 1);

        let mut iter = out.row_iter(&ExecutionContext::default()).unwrap();
        let mut seen: Vec<Row> = Vec::new();
        while seen.len() < stop_after {
            match iter.next().unwrap() {
                Some(row) => seen.push(row),
                None => break,
            }
        }
        iter.close().unwrap();
        drop(iter);
        drop(out);
        prop_assert_eq!(catalog.handles_in_use(), 0);
    }
}
