// tests/flow.rs
use anyhow::Result;
use shardflow::*;

fn sample(flow: &Flow) -> Result<Dataset> {
    Ok(flow.rows(vec![row![1; "b", 2], row![2; "a", 3], row![3; "c", 1]])?)
}

fn last_step_name(flow: &Flow) -> Option<&'static str> {
    flow.steps().last().map(|s| s.instruction.name())
}

#[test]
fn sources_have_one_shard_and_no_metadata() -> Result<()> {
    let flow = Flow::new();
    let d = sample(&flow)?;
    assert_eq!(d.shard_count(), 1);
    assert!(d.sorted_by().is_empty());
    assert!(d.partitioned_by().is_empty());
    assert_eq!(flow.step_count(), 1);
    assert_eq!(flow.dataset_count(), 1);
    assert_eq!(flow.dataset_meta(d.id()).as_ref(), Some(d.meta()));
    Ok(())
}

#[test]
fn repeated_partition_is_elided() -> Result<()> {
    let flow = Flow::new();
    let d = sample(&flow)?.round_robin(3)?;
    let p = d.partition(4, &[1])?;
    let steps = flow.step_count();
    let again = p.partition(4, &[1])?;
    assert_eq!(again.id(), p.id());
    assert_eq!(flow.step_count(), steps);

    // different key or shard count is real work
    assert_ne!(p.partition(2, &[1])?.id(), p.id());
    assert_ne!(p.partition(4, &[2])?.id(), p.id());
    Ok(())
}

#[test]
fn partition_wiring_depends_on_source_shards() -> Result<()> {
    let flow = Flow::new();
    let one = sample(&flow)?;
    let before = flow.step_count();
    let p = one.partition(4, &[1])?;
    assert_eq!(flow.step_count(), before + 1);
    assert_eq!(last_step_name(&flow), Some("ScatterPartitions"));
    assert_eq!(p.shard_count(), 4);
    assert_eq!(p.partitioned_by(), &[1]);

    let three = one.round_robin(3)?;
    let before = flow.step_count();
    let p = three.partition(2, &[1])?;
    assert_eq!(flow.step_count(), before + 2);
    assert_eq!(last_step_name(&flow), Some("CollectPartitions"));
    assert_eq!(p.shard_count(), 2);

    let steps = flow.steps();
    let collect = steps.last().expect("collect step");
    let inputs: Vec<Vec<usize>> = collect
        .tasks
        .iter()
        .map(|t| t.inputs.iter().map(|s| s.shard).collect())
        .collect();
    // bucket j of every scattered shard
    assert_eq!(inputs, vec![vec![0, 2, 4], vec![1, 3, 5]]);

    // one shard to one shard is already "partitioned"
    assert_eq!(one.partition(1, &[2])?.id(), one.id());
    Ok(())
}

#[test]
fn sort_metadata_drives_elision() -> Result<()> {
    let flow = Flow::new();
    let order = [OrderBy::asc(1)];
    let sorted = sample(&flow)?.local_sort(&order)?;
    assert_eq!(sorted.sorted_by(), &order);

    let steps = flow.step_count();
    assert_eq!(sorted.local_sort(&order)?.id(), sorted.id());
    assert_eq!(flow.step_count(), steps);

    // top by the order the shards already have only needs a limit
    sorted.local_top(2, &order)?;
    assert_eq!(last_step_name(&flow), Some("LocalLimit"));

    let top = sorted.local_top(2, &[OrderBy::desc(1)])?;
    assert_eq!(last_step_name(&flow), Some("LocalTop"));
    assert_eq!(top.sorted_by(), &[OrderBy::desc(1)]);
    Ok(())
}

#[test]
fn merging_requires_matching_sort_order() -> Result<()> {
    let flow = Flow::new();
    let wide = sample(&flow)?.round_robin(3)?;
    let err = wide.merge_sorted_to(1, &[OrderBy::asc(1)]).expect_err("unsorted merge");
    assert!(matches!(err, FlowError::Topology(_)));

    let sorted = wide.local_sort(&[OrderBy::asc(1)])?;
    let merged = sorted.merge_sorted_to(1, &[OrderBy::asc(1)])?;
    assert_eq!(merged.shard_count(), 1);
    assert_eq!(merged.sorted_by(), &[OrderBy::asc(1)]);

    let err = merged.merge_sorted_to(2, &[OrderBy::asc(1)]).expect_err("cannot grow");
    assert!(matches!(err, FlowError::Topology(_)));
    Ok(())
}

#[test]
fn tree_merge_takes_several_levels() -> Result<()> {
    let flow = Flow::new();
    let order = [OrderBy::asc(1)];
    let wide = sample(&flow)?.round_robin(9)?.local_sort(&order)?;
    let before = flow.step_count();
    let merged = wide.tree_merge_sorted_to(2, &order)?;
    // 9 -> 5 -> 3 -> 2 -> 1
    assert_eq!(flow.step_count(), before + 4);
    assert_eq!(merged.shard_count(), 1);
    assert!(matches!(wide.tree_merge_sorted_to(1, &order), Err(FlowError::Topology(_))));
    Ok(())
}

#[test]
fn shape_changing_steps_clear_metadata() -> Result<()> {
    let flow = Flow::new();
    let order = [OrderBy::asc(1)];
    let d = sample(&flow)?.partition(2, &[1])?.local_sort(&order)?;
    assert_eq!(d.partitioned_by(), &[1]);

    let mapped = d.map(|r: Row| Ok(vec![r]))?;
    assert!(mapped.sorted_by().is_empty());
    assert!(mapped.partitioned_by().is_empty());

    let filtered = d.filter(|_: &Row| Ok(true))?;
    assert_eq!(filtered.meta(), d.meta());

    let dealt = d.round_robin(2)?;
    assert_eq!(dealt.sorted_by(), &order);
    assert!(dealt.partitioned_by().is_empty());

    let merged = d.merge_to(1)?;
    assert!(merged.sorted_by().is_empty());
    Ok(())
}

#[test]
fn joins_report_their_output_layout() -> Result<()> {
    let flow = Flow::new();
    let left = sample(&flow)?;
    let right = sample(&flow)?.partition(3, &[1])?;

    let grouped = left.cogroup(&right, &[1])?;
    assert_eq!(grouped.shard_count(), 3);
    assert_eq!(grouped.sorted_by(), &[OrderBy::asc(1)]);
    assert_eq!(grouped.partitioned_by(), &[1]);

    let joined = left.hash_join(&right, &[1])?;
    assert_eq!(joined.shard_count(), 3);
    assert_eq!(joined.partitioned_by(), &[1]);
    assert!(joined.sorted_by().is_empty());
    Ok(())
}

#[test]
fn builder_errors_are_topology_errors() -> Result<()> {
    let flow = Flow::new();
    let d = sample(&flow)?;
    assert!(matches!(d.partition(0, &[1]), Err(FlowError::Topology(_))));
    assert!(matches!(d.partition(2, &[]), Err(FlowError::Topology(_))));
    assert!(matches!(d.select(&[0]), Err(FlowError::Topology(_))));
    assert!(matches!(d.local_sort(&[]), Err(FlowError::Topology(_))));
    assert!(matches!(d.round_robin(0), Err(FlowError::Topology(_))));

    let other = sample(&Flow::new())?;
    assert!(matches!(d.hash_join(&other, &[1]), Err(FlowError::Topology(_))));
    Ok(())
}

#[test]
fn steps_expand_into_one_task_per_output_shard() -> Result<()> {
    let flow = Flow::new();
    let d = sample(&flow)?.round_robin(4)?.local_sort(&[OrderBy::asc(1)])?;
    let steps = flow.steps();
    let sort = steps.last().expect("sort step");
    assert_eq!(sort.tasks.len(), d.shard_count());
    assert_eq!(sort.name(), format!("LocalSort#{}", sort.id.raw()));
    Ok(())
}

#[test]
fn invalid_config_is_rejected() {
    let config = FlowConfig {
        tree_merge_factor: 1,
        ..FlowConfig::default()
    };
    assert!(matches!(Flow::with_config(config), Err(FlowError::Config(_))));
}
