// tests/instructions.rs
use anyhow::Result;
use shardflow::codec::{read_row, write_row};
use shardflow::functions::{self, Reducer};
use shardflow::instruction::*;
use shardflow::pipe::pipe;
use shardflow::*;
use std::sync::Arc;

fn frames(rows: &[Row]) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    for r in rows {
        write_row(&mut buf, r.ts, &r.fields)?;
    }
    Ok(buf)
}

fn rows_of(bytes: &[u8]) -> Result<Vec<Row>> {
    let mut rd = bytes;
    let mut out = Vec::new();
    while let Some(r) = read_row(&mut rd)? {
        out.push(r);
    }
    Ok(out)
}

fn fields(rows: &[Row]) -> Vec<Vec<Value>> {
    rows.iter().map(|r| r.fields.clone()).collect()
}

fn pairs() -> Vec<Row> {
    vec![row![1; "b", 2], row![2; "a", 3], row![3; "c", 1], row![4; "a", 1]]
}

fn seq<V: Into<Value>>(items: Vec<V>) -> Value {
    Value::Seq(items.into_iter().map(Into::into).collect())
}

#[test]
fn local_sort_orders_by_each_component() -> Result<()> {
    let input = frames(&pairs())?;
    let mut out = Vec::new();
    let mut stats = InstructionStat::default();
    do_local_sort(
        input.as_slice(),
        &mut out,
        &[OrderBy::asc(1), OrderBy::desc(2)],
        usize::MAX,
        None,
        &mut stats,
    )?;
    assert_eq!(
        fields(&rows_of(&out)?),
        vec![
            vec![Value::from("a"), Value::from(3)],
            vec![Value::from("a"), Value::from(1)],
            vec![Value::from("b"), Value::from(2)],
            vec![Value::from("c"), Value::from(1)],
        ]
    );
    assert_eq!((stats.input_counter, stats.output_counter), (4, 4));
    Ok(())
}

#[test]
fn local_sort_is_stable() -> Result<()> {
    let input = frames(&[row![1; 2, "x"], row![2; 1, "y"], row![3; 2, "z"], row![4; 1, "w"]])?;
    let mut out = Vec::new();
    do_local_sort(
        input.as_slice(),
        &mut out,
        &[OrderBy::asc(1)],
        usize::MAX,
        None,
        &mut InstructionStat::default(),
    )?;
    let ts: Vec<i64> = rows_of(&out)?.iter().map(|r| r.ts).collect();
    assert_eq!(ts, vec![2, 4, 1, 3]);
    Ok(())
}

#[cfg(feature = "spilling")]
#[test]
fn local_sort_spills_and_merges_runs() -> Result<()> {
    let dir = tempfile::tempdir()?;
    // enough rows for many runs of a few rows each, with duplicate keys
    let rows: Vec<Row> = (0..500i64).map(|i| row![i; (i * 7919) % 97, i]).collect();
    let input = frames(&rows)?;
    let mut out = Vec::new();
    let mut stats = InstructionStat::default();
    do_local_sort(
        input.as_slice(),
        &mut out,
        &[OrderBy::asc(1)],
        64,
        Some(dir.path()),
        &mut stats,
    )?;

    let sorted = rows_of(&out)?;
    assert_eq!(sorted.len(), rows.len());
    let mut expected = rows.clone();
    expected.sort_by(|a, b| a.fields[0].cmp(&b.fields[0]));
    // stable across runs: equal keys stay in arrival order
    assert_eq!(sorted, expected);
    assert_eq!(stats.input_counter, 500);
    assert_eq!(stats.output_counter, 500);
    Ok(())
}

#[test]
fn local_top_follows_the_order_direction() -> Result<()> {
    let input = frames(&[row![1; "a", 1], row![2; "b", 2], row![3; "a", 3]])?;
    let mut out = Vec::new();
    do_local_top(input.as_slice(), &mut out, 1, &[OrderBy::desc(2)], &mut InstructionStat::default())?;
    assert_eq!(fields(&rows_of(&out)?), vec![vec![Value::from("a"), Value::from(3)]]);

    let mut out = Vec::new();
    do_local_top(input.as_slice(), &mut out, 2, &[OrderBy::asc(2)], &mut InstructionStat::default())?;
    assert_eq!(
        fields(&rows_of(&out)?),
        vec![
            vec![Value::from("a"), Value::from(1)],
            vec![Value::from("b"), Value::from(2)],
        ]
    );
    Ok(())
}

#[test]
fn local_top_ties_keep_earlier_rows() -> Result<()> {
    let input = frames(&[row![1; "x", 5], row![2; "y", 5], row![3; "z", 1], row![4; "w", 5]])?;
    let mut out = Vec::new();
    do_local_top(input.as_slice(), &mut out, 2, &[OrderBy::desc(2)], &mut InstructionStat::default())?;
    let ts: Vec<i64> = rows_of(&out)?.iter().map(|r| r.ts).collect();
    assert_eq!(ts, vec![1, 2]);
    Ok(())
}

#[test]
fn local_top_with_large_or_zero_n() -> Result<()> {
    let input = frames(&pairs())?;
    let mut out = Vec::new();
    let mut stats = InstructionStat::default();
    do_local_top(input.as_slice(), &mut out, 10, &[OrderBy::desc(1)], &mut stats)?;
    let keys: Vec<Value> = rows_of(&out)?.into_iter().map(|r| r.fields[0].clone()).collect();
    assert_eq!(
        keys,
        vec![Value::from("c"), Value::from("b"), Value::from("a"), Value::from("a")]
    );
    assert_eq!((stats.input_counter, stats.output_counter), (4, 4));

    let mut out = Vec::new();
    do_local_top(input.as_slice(), &mut out, 0, &[OrderBy::asc(1)], &mut InstructionStat::default())?;
    assert!(out.is_empty());
    Ok(())
}

#[test]
fn local_distinct_drops_adjacent_duplicates() -> Result<()> {
    let input = frames(&[
        row![1; "a", 1],
        row![2; "a", 9],
        row![3; "b", 1],
        row![4; "b", 1],
        row![5; "a", 1],
    ])?;
    let mut out = Vec::new();
    let mut stats = InstructionStat::default();
    do_local_distinct(input.as_slice(), &mut out, &[OrderBy::asc(1)], &mut stats)?;
    let ts: Vec<i64> = rows_of(&out)?.iter().map(|r| r.ts).collect();
    assert_eq!(ts, vec![1, 3, 5]);
    assert_eq!((stats.input_counter, stats.output_counter), (5, 3));
    Ok(())
}

#[test]
fn merge_sorted_interleaves_sources() -> Result<()> {
    let a = frames(&[row![1; 1], row![2; 4], row![3; 9]])?;
    let b = frames(&[row![4; 2], row![5; 4], row![6; 5]])?;
    let c = frames(&[])?;
    let mut out = Vec::new();
    let mut stats = InstructionStat::default();
    do_merge_sorted_to(
        vec![a.as_slice(), b.as_slice(), c.as_slice()],
        &mut out,
        &[OrderBy::asc(1)],
        &mut stats,
    )?;
    let ts: Vec<i64> = rows_of(&out)?.iter().map(|r| r.ts).collect();
    // equal keys come from the lower-numbered source first
    assert_eq!(ts, vec![1, 4, 2, 5, 6, 3]);
    assert_eq!((stats.input_counter, stats.output_counter), (6, 6));
    Ok(())
}

#[test]
fn scatter_sends_equal_keys_to_one_shard() -> Result<()> {
    let rows: Vec<Row> = (0..60i64).map(|i| row![i; format!("k{}", i % 6), i]).collect();
    let input = frames(&rows)?;
    let mut outs = vec![Vec::<u8>::new(); 3];
    let mut stats = InstructionStat::default();
    do_scatter_partitions(input.as_slice(), &mut outs, &[1], &mut stats)?;

    let mut total = 0;
    for (shard, out) in outs.iter().enumerate() {
        for r in rows_of(out)? {
            assert_eq!(scatter_partitions_shard(&r, 3)?, shard);
            total += 1;
        }
    }
    assert_eq!(total, 60);
    assert_eq!(stats.output_counter, 60);
    Ok(())
}

fn scatter_partitions_shard(r: &Row, n: usize) -> Result<usize> {
    Ok(codec::hash_keys(&r.key(&[1])?)? as usize % n)
}

#[test]
fn scatter_without_outputs_fails() -> Result<()> {
    let input = frames(&pairs())?;
    let mut outs: Vec<Vec<u8>> = Vec::new();
    let res = do_scatter_partitions(input.as_slice(), &mut outs, &[1], &mut InstructionStat::default());
    assert!(matches!(res, Err(FlowError::Instruction { .. })));
    Ok(())
}

#[test]
fn hash_join_matches_right_rows_against_left() -> Result<()> {
    let left = frames(&[row![1; "a", "apple"], row![2; "b", "banana"]])?;
    let right = frames(&[row![10; "a", 1], row![11; "c", 2], row![12; "a", 3], row![13; "b", 4]])?;
    let mut out = Vec::new();
    let mut stats = InstructionStat::default();
    do_local_hash_and_join_with(left.as_slice(), right.as_slice(), &mut out, &[1], &mut stats)?;

    let rows = rows_of(&out)?;
    assert_eq!(
        fields(&rows),
        vec![
            vec![Value::from("a"), Value::from(1), Value::from("apple")],
            vec![Value::from("a"), Value::from(3), Value::from("apple")],
            vec![Value::from("b"), Value::from(4), Value::from("banana")],
        ]
    );
    assert_eq!(rows.iter().map(|r| r.ts).collect::<Vec<_>>(), vec![10, 12, 13]);
    assert_eq!((stats.input_counter, stats.output_counter), (6, 3));
    Ok(())
}

#[test]
fn hash_join_with_empty_left_drains_right() -> Result<()> {
    let right = frames(&pairs())?;
    let mut out = Vec::new();
    do_local_hash_and_join_with(&b""[..], right.as_slice(), &mut out, &[1], &mut InstructionStat::default())?;
    assert!(out.is_empty());
    Ok(())
}

#[test]
fn cogroup_emits_every_key_of_either_side() -> Result<()> {
    let left = frames(&[row![1; "a", 1], row![2; "a", 2], row![3; "c", 3]])?;
    let right = frames(&[row![4; "b", "x"], row![9; "c", "y"], row![5; "d", "z"]])?;
    let mut out = Vec::new();
    let mut stats = InstructionStat::default();
    do_cogroup_partitioned_sorted(left.as_slice(), right.as_slice(), &mut out, &[1], &mut stats)?;

    let rows = rows_of(&out)?;
    assert_eq!(
        fields(&rows),
        vec![
            vec![Value::from("a"), seq(vec![1, 2]), Value::Seq(vec![])],
            vec![Value::from("b"), Value::Seq(vec![]), seq(vec!["x"])],
            vec![Value::from("c"), seq(vec![3]), seq(vec!["y"])],
            vec![Value::from("d"), Value::Seq(vec![]), seq(vec!["z"])],
        ]
    );
    assert_eq!(rows[2].ts, 9);
    assert_eq!((stats.input_counter, stats.output_counter), (6, 4));
    Ok(())
}

#[test]
fn cogroup_keeps_multi_field_values_together() -> Result<()> {
    let left = frames(&[row![1; "k", 1, "one"]])?;
    let mut out = Vec::new();
    do_cogroup_partitioned_sorted(left.as_slice(), &b""[..], &mut out, &[1], &mut InstructionStat::default())?;
    assert_eq!(
        fields(&rows_of(&out)?),
        vec![vec![
            Value::from("k"),
            Value::Seq(vec![seq(vec![Value::from(1), Value::from("one")])]),
            Value::Seq(vec![]),
        ]]
    );
    Ok(())
}

#[test]
fn local_limit_skips_then_takes() -> Result<()> {
    let input = frames(&pairs())?;
    let mut out = Vec::new();
    let mut stats = InstructionStat::default();
    do_local_limit(input.as_slice(), &mut out, 2, 1, &mut stats)?;
    let ts: Vec<i64> = rows_of(&out)?.iter().map(|r| r.ts).collect();
    assert_eq!(ts, vec![2, 3]);
    assert_eq!(stats.output_counter, 2);
    Ok(())
}

#[test]
fn select_projects_fields() -> Result<()> {
    let input = frames(&[row![7; "a", 1, true]])?;
    let mut out = Vec::new();
    do_select(input.as_slice(), &mut out, &[3, 1], &mut InstructionStat::default())?;
    let rows = rows_of(&out)?;
    assert_eq!(rows, vec![row![7; true, "a"]]);
    Ok(())
}

#[test]
fn local_reduce_by_folds_runs_of_equal_keys() -> Result<()> {
    let input = frames(&[row![1; "a", 1], row![5; "a", 2], row![2; "b", 10], row![3; "a", 4]])?;
    let sum: Reducer = Arc::new(|acc: &[Value], next: &[Value]| {
        let total = acc[0].as_i64().unwrap_or(0) + next[0].as_i64().unwrap_or(0);
        Ok(vec![Value::from(total)])
    });
    let mut out = Vec::new();
    let mut stats = InstructionStat::default();
    do_local_reduce_by(input.as_slice(), &mut out, &[1], &sum, &mut stats)?;
    assert_eq!(rows_of(&out)?, vec![row![5; "a", 3], row![2; "b", 10], row![3; "a", 4]]);
    assert_eq!((stats.input_counter, stats.output_counter), (4, 3));
    Ok(())
}

#[test]
fn round_robin_and_broadcast_fan_out() -> Result<()> {
    let input = frames(&pairs())?;
    let mut outs = vec![Vec::<u8>::new(); 2];
    do_round_robin(input.as_slice(), &mut outs, &mut InstructionStat::default())?;
    let mut ts: Vec<Vec<i64>> = Vec::new();
    for o in &outs {
        ts.push(rows_of(o)?.iter().map(|r| r.ts).collect());
    }
    assert_eq!(ts, vec![vec![1, 3], vec![2, 4]]);

    let mut outs = vec![Vec::<u8>::new(); 3];
    do_broadcast(input.as_slice(), &mut outs, &mut InstructionStat::default())?;
    for o in &outs {
        assert_eq!(rows_of(o)?, pairs());
    }
    Ok(())
}

#[test]
fn map_and_filter_use_registered_functions() -> Result<()> {
    let doubled = functions::register_mapper(|r: Row| Ok(vec![r.clone(), r]));
    let only_a = functions::register_predicate(|r: &Row| Ok(r.fields[0] == Value::from("a")));
    let input = frames(&pairs())?;

    let mut mapped = Vec::new();
    do_map(input.as_slice(), &mut mapped, &functions::mapper(&doubled)?, &mut InstructionStat::default())?;
    assert_eq!(rows_of(&mapped)?.len(), 8);

    let mut filtered = Vec::new();
    let mut stats = InstructionStat::default();
    do_filter(mapped.as_slice(), &mut filtered, &functions::predicate(&only_a)?, &mut stats)?;
    assert_eq!(rows_of(&filtered)?.len(), 4);
    assert_eq!((stats.input_counter, stats.output_counter), (8, 4));
    Ok(())
}

#[test]
fn instruction_functions_run_over_streams() -> Result<()> {
    let input = frames(&pairs())?;
    let (w0, r0) = pipe(64);
    let (w1, r1) = pipe(64);
    let scatter = ScatterPartitions::new(vec![1]);
    let run = scatter.function();
    let mut stats = InstructionStat::default();
    let readers: Vec<instruction::StreamReader> = vec![Box::new(std::io::Cursor::new(input))];
    let writers: Vec<instruction::StreamWriter> = vec![Box::new(w0), Box::new(w1)];
    run(readers, writers, &mut stats)?;

    let mut total = 0;
    for mut r in [r0, r1] {
        while read_row(&mut r)?.is_some() {
            total += 1;
        }
    }
    assert_eq!(total, 4);
    assert_eq!(stats.output_counter, 4);
    Ok(())
}

#[test]
fn wrong_stream_counts_are_instruction_errors() {
    let sort = LocalSort::new(vec![OrderBy::asc(1)], 1);
    let res = (sort.function())(Vec::new(), Vec::new(), &mut InstructionStat::default());
    assert!(matches!(res, Err(FlowError::Instruction { .. })));
}

#[test]
fn negative_top_n_fails_at_execution() {
    let (w, _r) = pipe(4);
    let top = LocalTop::new(-1, vec![OrderBy::asc(1)]);
    let readers: Vec<instruction::StreamReader> = vec![Box::new(&b""[..])];
    let writers: Vec<instruction::StreamWriter> = vec![Box::new(w)];
    let res = (top.function())(readers, writers, &mut InstructionStat::default());
    assert!(matches!(res, Err(FlowError::Instruction { .. })));
}
