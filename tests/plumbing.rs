// tests/plumbing.rs
use anyhow::Result;
use shardflow::codec::{read_row, write_row};
use shardflow::pipe::pipe;
use shardflow::plumbing::{
    CopyCounts, copy_and_close, copy_into, copy_multiple_readers, frames_to_lines, lines_to_frames,
    pipe_through_lines,
};
use shardflow::*;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::thread;

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

struct FailingWriter;

impl Write for FailingWriter {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::other("disk full"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct FailingReader;

impl Read for FailingReader {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::other("disk on fire"))
    }
}

#[test]
fn fan_in_copies_every_frame() -> Result<()> {
    let a = frames(&[row![1; "a1"], row![2; "a2"]])?;
    let b = frames(&[])?;
    let c = frames(&[row![3; "c1"], row![4; "c2"], row![5; "c3"]])?;

    let mut out = Vec::new();
    let mut counts = CopyCounts::default();
    copy_multiple_readers(vec![a.as_slice(), b.as_slice(), c.as_slice()], &mut out, &mut counts)?;

    assert_eq!(counts, CopyCounts { input: 5, output: 5 });
    let mut got: Vec<i64> = rows_of(&out)?.iter().map(|r| r.ts).collect();
    got.sort_unstable();
    assert_eq!(got, vec![1, 2, 3, 4, 5]);
    Ok(())
}

#[test]
fn fan_in_reports_a_corrupt_input() -> Result<()> {
    let good = frames(&[row![1; "x"], row![2; "y"]])?;
    let mut bad = frames(&[row![3; "z"]])?;
    bad.truncate(bad.len() - 1);

    let mut out = Vec::new();
    let mut counts = CopyCounts::default();
    let err = copy_multiple_readers(vec![good.as_slice(), bad.as_slice()], &mut out, &mut counts)
        .expect_err("truncated input must fail");
    assert!(matches!(err, FlowError::Decode { .. }));
    // the healthy reader was still drained
    assert_eq!(counts.input, 2);
    Ok(())
}

#[test]
fn fan_in_write_failure_still_drains_producers() -> Result<()> {
    const FRAMES: i64 = 50;
    let mut readers = Vec::new();
    let mut producers = Vec::new();
    for p in 0..2i64 {
        let (mut w, r) = pipe(1);
        readers.push(r);
        producers.push(thread::spawn(move || -> shardflow::Result<()> {
            for i in 0..FRAMES {
                write_row(&mut w, i, &[Value::from(p), Value::from(i)])?;
            }
            Ok(())
        }));
    }

    let mut counts = CopyCounts::default();
    let err = copy_multiple_readers(readers, &mut FailingWriter, &mut counts).expect_err("writer fails");
    assert!(matches!(err, FlowError::Write(_)));
    for producer in producers {
        // a producer blocked on a full pipe would never get here
        producer.join().expect("producer thread")?;
    }
    assert_eq!(counts.input, 2 * FRAMES);
    assert_eq!(counts.output, 0);
    Ok(())
}

#[test]
fn lines_become_rows_of_strings() -> Result<()> {
    let text = b"a\tb\nc\r\n\t\n";
    let mut out = Vec::new();
    let mut stats = InstructionStat::default();
    let mut errors = Vec::<u8>::new();
    lines_to_frames("encode", &text[..], &mut out, &mut stats, &mut errors)?;

    let rows = rows_of(&out)?;
    assert_eq!(
        fields(&rows),
        vec![
            vec![Value::from("a"), Value::from("b")],
            vec![Value::from("c")],
            vec![Value::from(""), Value::from("")],
        ]
    );
    assert_eq!((stats.input_counter, stats.output_counter), (3, 3));
    assert!(errors.is_empty());
    Ok(())
}

#[test]
fn rows_become_tab_separated_lines() -> Result<()> {
    let input = frames(&[row![1; "a", 1], row![2; "b", Value::Nil, 2.5]])?;
    let mut out = Vec::new();
    let mut stats = InstructionStat::default();
    let mut errors = Vec::<u8>::new();
    frames_to_lines("decode", input.as_slice(), &mut out, &mut stats, &mut errors)?;

    assert_eq!(String::from_utf8(out)?, "a\t1\nb\t\t2.5\n");
    assert_eq!(stats.output_counter, 2);
    Ok(())
}

#[test]
fn copying_into_a_closed_pipe_is_not_an_error() -> Result<()> {
    let (w, r) = pipe(1);
    drop(r);
    let mut errors = Vec::<u8>::new();
    copy_and_close("feed", &b"payload"[..], w, &mut errors)?;
    assert!(errors.is_empty());
    Ok(())
}

#[test]
fn read_failures_are_reported_with_the_stage_name() {
    let mut sink = Vec::new();
    let mut errors = Vec::<u8>::new();
    let res = copy_into("loader", FailingReader, &mut sink, &mut errors);
    assert!(matches!(res, Err(FlowError::Io(_))));
    let report = String::from_utf8_lossy(&errors);
    assert!(report.starts_with("loader>"), "got {report}");
    assert!(report.contains("disk on fire"));
}

#[test]
fn rows_round_trip_through_a_line_process() -> Result<()> {
    let input = frames(&[row![1; "hello", "world"], row![2; "bye"]])?;
    let (stdin_w, stdin_r) = pipe(4);
    let (stdout_w, stdout_r) = pipe(4);

    // stands in for an external process that upper-cases its input
    let process = thread::spawn(move || -> io::Result<()> {
        let mut out = stdout_w;
        for line in BufReader::new(stdin_r).lines() {
            writeln!(out, "{}", line?.to_uppercase())?;
        }
        Ok(())
    });

    let mut out = Vec::new();
    let mut stats = InstructionStat::default();
    let mut errors = Vec::<u8>::new();
    pipe_through_lines(
        "upper",
        input.as_slice(),
        &mut out,
        stdin_w,
        stdout_r,
        &mut stats,
        &mut errors,
    )?;
    process.join().expect("process thread")?;

    assert_eq!(
        fields(&rows_of(&out)?),
        vec![
            vec![Value::from("HELLO"), Value::from("WORLD")],
            vec![Value::from("BYE")],
        ]
    );
    assert_eq!((stats.input_counter, stats.output_counter), (2, 2));
    assert!(errors.is_empty());
    Ok(())
}

#[test]
fn separators_inside_fields_survive_a_line_process() -> Result<()> {
    let tricky = row![1; "a\tb", "one\ntwo", "back\\slash\r"];
    let input = frames(&[tricky.clone(), row![2; "plain"]])?;

    let mut text = Vec::new();
    frames_to_lines("decode", input.as_slice(), &mut text, &mut InstructionStat::default(), &mut Vec::<u8>::new())?;
    assert_eq!(String::from_utf8(text)?, "a\\tb\tone\\ntwo\tback\\\\slash\\r\nplain\n");

    let (stdin_w, stdin_r) = pipe(4);
    let (stdout_w, stdout_r) = pipe(4);
    let process = thread::spawn(move || {
        let (mut from, mut to) = (stdin_r, stdout_w);
        io::copy(&mut from, &mut to)
    });
    let mut out = Vec::new();
    let mut stats = InstructionStat::default();
    pipe_through_lines("cat", input.as_slice(), &mut out, stdin_w, stdout_r, &mut stats, &mut Vec::<u8>::new())?;
    process.join().expect("process thread")?;

    let rows = rows_of(&out)?;
    assert_eq!(fields(&rows), vec![tricky.fields, vec![Value::from("plain")]]);
    Ok(())
}
