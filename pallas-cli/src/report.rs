//! Table-formatted trace summaries, grounded on the original `pallas_info` tool's output
//! layout (archive/thread/event/sequence/loop tables, `guess_*_name` heuristics).

use std::path::Path;

use anyhow::{Context, Result};

use pallas_core::{
    CommRef, DefinitionTables, Event, GlobalDefinitionTables, Loop, RecordKind, RegionRef,
    Sequence, Thread, Token, TokenKind,
};
use pallas_format::ParsedGlobal;

pub struct Options {
    pub show_definitions: bool,
    pub list_archives: bool,
    pub list_threads: bool,
    pub thread_content: bool,
    pub content: bool,
    pub durations: bool,
    pub archive_details: bool,
    pub archive_filter: Option<u32>,
    pub thread_filter: Option<u32>,
}

impl Options {
    fn wants_archive(&self, id: u32) -> bool {
        self.archive_filter.is_none_or(|f| f == id)
    }

    fn wants_thread(&self, id: u32) -> bool {
        self.thread_filter.is_none_or(|f| f == id)
    }
}

fn ns_to_s(ns: u64) -> f64 {
    ns as f64 / 1e9
}

pub fn print_trace(root: &Path, global: &ParsedGlobal, opts: &Options) -> Result<()> {
    print_global_header(root, global, opts);

    if opts.list_archives {
        println!("\n{:<14}{:<20}{:>15}", "#Archive_id", "Archive_name", "Nb_threads");
        for &archive_id in &global.archive_ids {
            if !opts.wants_archive(archive_id) {
                continue;
            }
            let archive = pallas_format::load_archive(root, archive_id)
                .with_context(|| format!("reading archive {archive_id}"))?;
            println!(
                "{:<14}{:<20}{:>15}",
                archive_id,
                format!("archive_{archive_id}"),
                archive.thread_ids.len()
            );
        }
    }

    if opts.list_threads {
        println!();
        print_thread_header();
        for &archive_id in &global.archive_ids {
            if !opts.wants_archive(archive_id) {
                continue;
            }
            let archive = pallas_format::load_archive(root, archive_id)
                .with_context(|| format!("reading archive {archive_id}"))?;
            for &thread_id in &archive.thread_ids {
                if !opts.wants_thread(thread_id) {
                    continue;
                }
                let thread = pallas_format::load_thread(root, archive_id, thread_id)
                    .with_context(|| format!("reading thread {thread_id} of archive {archive_id}"))?;
                print_thread_summary(&thread);
            }
        }
    }

    if opts.thread_content {
        for &archive_id in &global.archive_ids {
            if !opts.wants_archive(archive_id) {
                continue;
            }
            let archive = pallas_format::load_archive(root, archive_id)
                .with_context(|| format!("reading archive {archive_id}"))?;
            for &thread_id in &archive.thread_ids {
                if !opts.wants_thread(thread_id) {
                    continue;
                }
                let thread = pallas_format::load_thread(root, archive_id, thread_id)
                    .with_context(|| format!("reading thread {thread_id} of archive {archive_id}"))?;
                print_thread_content(&thread, &archive.definitions, opts);
            }
        }
    }

    Ok(())
}

fn print_global_header(root: &Path, global: &ParsedGlobal, opts: &Options) {
    println!("Main archive:");
    if opts.archive_details {
        println!("\tdir_name:   {}", root.display());
        println!(
            "\ttrace_name: {}",
            root.file_name().and_then(|n| n.to_str()).unwrap_or("trace")
        );
    }
    println!("\tfullpath:    {}", root.display());
    println!("\tnb_archives: {}", global.archive_ids.len());
    println!("\tnb_process:  {}", global.definitions.location_groups.len());
    println!("\tnb_threads:  {}", global.definitions.locations.len());

    if opts.show_definitions {
        print_global_definitions(&global.definitions);
    }
    println!();
}

fn print_global_definitions(defs: &GlobalDefinitionTables) {
    if !defs.base.strings.is_empty() {
        println!("\tStrings {{.nb_strings: {}}}:", defs.base.strings.len());
        for (i, s) in defs.base.strings.iter().enumerate() {
            println!("\t\t{i}: '{s}'");
        }
    }
    if !defs.base.regions.is_empty() {
        println!("\tRegions {{.nb_regions: {}}}:", defs.base.regions.len());
        for (i, r) in defs.base.regions.iter().enumerate() {
            println!("\t\t{i}: {}", defs.base.strings.get(r.name).unwrap_or("?"));
        }
    }
    if !defs.base.groups.is_empty() {
        println!("\tGroups {{.nb_groups: {}}}:", defs.base.groups.len());
        for (i, g) in defs.base.groups.iter().enumerate() {
            let members: Vec<String> = g.members.iter().map(u32::to_string).collect();
            println!(
                "\t\t{i}: '{}' [{}]",
                defs.base.strings.get(g.name).unwrap_or("?"),
                members.join(", ")
            );
        }
    }
    if !defs.base.comms.is_empty() {
        println!("\tComms {{.nb_comms: {}}}:", defs.base.comms.len());
        for (i, c) in defs.base.comms.iter().enumerate() {
            println!(
                "\t\t{i}: '{}' (group {})",
                defs.base.strings.get(c.name).unwrap_or("?"),
                c.group.0
            );
        }
    }
    if !defs.location_groups.is_empty() {
        println!("\tLocation_groups {{.nb_lg: {}}}:", defs.location_groups.len());
        for (i, lg) in defs.location_groups.iter().enumerate() {
            print!("\t\t{i}: {}", defs.base.strings.get(lg.name).unwrap_or("?"));
            if !lg.parent.is_none() {
                print!(", parent: {}", lg.parent.0);
            }
            println!();
        }
    }
    if !defs.locations.is_empty() {
        println!("\tLocations {{.nb_loc: {}}}:", defs.locations.len());
        for (i, l) in defs.locations.iter().enumerate() {
            println!(
                "\t\t{i}: {}, parent: {}",
                defs.base.strings.get(l.name).unwrap_or("?"),
                l.parent.0
            );
        }
    }
}

fn print_thread_header() {
    println!(
        "{:<20}{:<15}{:>15}{:>15}{:>15}{:>15}{:>15}{:>15}",
        "#Thread_name", "Thread_id", "First_ts", "Last_ts", "Duration(s)", "Nb_events", "Nb_sequences", "Nb_loops"
    );
}

fn print_thread_summary(thread: &Thread) {
    let occurrences = thread.root_occurrences();
    let first_ts = occurrences.timestamps.front().unwrap_or(0);
    let duration = occurrences.durations.front().unwrap_or(0);
    println!(
        "{:<20}{:<15}{:>15}{:>15}{:>15.6}{:>15}{:>15}{:>15}",
        format!("thread_{}", thread.id),
        thread.id,
        first_ts,
        first_ts + duration,
        ns_to_s(duration),
        thread.events().len(),
        thread.sequences().len(),
        thread.loops().len(),
    );
}

fn print_thread_content(thread: &Thread, defs: &DefinitionTables, opts: &Options) {
    print_thread_header();
    print_thread_summary(thread);

    println!("\nEvents {{.nb_events: {}}}", thread.events().len());
    println!(
        "{:<14}{:<35}{:>20}{:>20}{:>20}{:>20}",
        "#Event_id", "Event_name", "Nb_occurence", "Min_duration(ns)", "Max_duration(ns)", "Mean_duration(ns)"
    );
    for (i, summary) in thread.events().iter().enumerate() {
        let stats = summary.durations.stats();
        println!(
            "E{:<13}{:<35}{:>20}{:>20}{:>20}{:>20}",
            i,
            event_name(defs, &summary.event),
            summary.count,
            if stats.size == 0 { 0 } else { stats.min },
            stats.max,
            stats.mean,
        );
    }

    println!("\nSequences {{.nb_sequences: {}}}", thread.sequences().len());
    print_sequence_header();
    for (i, seq) in thread.sequences().iter().enumerate() {
        print_sequence(thread, defs, i as u32, seq, false, opts);
    }
    if opts.content || opts.durations {
        for (i, seq) in thread.sequences().iter().enumerate() {
            print_sequence(thread, defs, i as u32, seq, true, opts);
        }
    }

    println!("\nLoops {{.nb_loops: {}}}", thread.loops().len());
    println!(
        "{:<14}{:<35}{:>18}{:>18}{:>18}{:>18}",
        "#Loop_id", "Loop_name", "Nb_occurence", "Min_nb_iter", "Max_nb_iter", "Mean_nb_iter"
    );
    for (i, l) in thread.loops().iter().enumerate() {
        print_loop(thread, defs, i as u32, l);
    }
}

fn print_sequence_header() {
    println!(
        "{:<14}{:<35}{:>18}{:>18}{:>18}{:>18}{:>18}{:>18}",
        "#Sequence_id",
        "Sequence_name",
        "Nb_occurence",
        "Min_duration(s)",
        "Max_duration(s)",
        "Mean_duration(s)",
        "Total_duration(s)",
        "Nb_token",
    );
}

fn print_sequence(
    thread: &Thread,
    defs: &DefinitionTables,
    id: u32,
    seq: &Sequence,
    details: bool,
    opts: &Options,
) {
    let occurrences = thread.sequence_occurrences(Token::sequence(id)).expect("in range");
    let stats = occurrences.durations.stats();
    if !details {
        println!(
            "S{:<13}{:<35}{:>18}{:>18.6}{:>18.6}{:>18.6}{:>18.6}{:>18}",
            id,
            guess_sequence_name(thread, defs, id, seq),
            stats.size,
            ns_to_s(if stats.size == 0 { 0 } else { stats.min }),
            ns_to_s(stats.max),
            ns_to_s(stats.mean),
            ns_to_s(stats.mean * stats.size as u64),
            seq.len(),
        );
        return;
    }

    if opts.content {
        println!("\n------------------- Sequence{id} contains:");
        for &token in &seq.tokens {
            println!("\t{}", token_string(thread, defs, token));
        }
        println!("------------------- End of sequence{id}");
    }
    if opts.durations {
        println!("\n------------------- Sequence{id} duration:");
        for d in occurrences.durations.iter() {
            println!("\t{d}");
        }
        println!("------------------- End of sequence{id} durations.");
    }
}

fn print_loop(thread: &Thread, defs: &DefinitionTables, id: u32, l: &Loop) {
    let stats = l.iterations.stats();
    println!(
        "L{:<13}{:<35}{:>18}{:>18}{:>18}{:>18}",
        id,
        guess_loop_name(thread, defs, l),
        l.occurrence_count(),
        if stats.size == 0 { 0 } else { stats.min },
        stats.max,
        stats.mean,
    );
}

fn event_name(defs: &DefinitionTables, event: &Event) -> String {
    let region_name = region_name(defs, event.region);
    match event.record_kind {
        RecordKind::EnterRegion => format!("Enter({region_name})"),
        RecordKind::LeaveRegion => format!("Leave({region_name})"),
        RecordKind::Singleton => region_name,
        RecordKind::MpiSend => format!("MpiSend({region_name})"),
        RecordKind::MpiRecv => format!("MpiRecv({region_name})"),
        RecordKind::MetricSample => format!("Metric({region_name})"),
        RecordKind::ThreadBegin => "ThreadBegin".to_string(),
        RecordKind::ThreadEnd => "ThreadEnd".to_string(),
        RecordKind::Other(code) => format!("Other({code})"),
    }
}

fn region_name(defs: &DefinitionTables, region: RegionRef) -> String {
    if region.is_none() {
        return "-".to_string();
    }
    defs.regions
        .get(region.0)
        .and_then(|r| defs.strings.get(r.name))
        .unwrap_or("?")
        .to_string()
}

fn comm_name(defs: &DefinitionTables, comm: CommRef) -> String {
    if comm.is_none() {
        return String::new();
    }
    defs.comms
        .get(comm.0)
        .and_then(|c| defs.strings.get(c.name))
        .unwrap_or("?")
        .to_string()
}

fn token_string(thread: &Thread, defs: &DefinitionTables, token: Token) -> String {
    match token.kind() {
        TokenKind::Event => {
            let summary = thread.event_summary(token).expect("validated at load time");
            event_name(defs, &summary.event)
        },
        TokenKind::Sequence => {
            let seq = thread.sequence(token).expect("validated at load time");
            guess_sequence_name(thread, defs, token.id(), seq)
        },
        TokenKind::Loop => {
            let l = thread.loop_(token).expect("validated at load time");
            guess_loop_name(thread, defs, l)
        },
        TokenKind::Invalid => "Unknown token".to_string(),
    }
}

/// Mirrors the original tool's `guess_sequence_name`: a short sequence starting with an
/// event is named after that event's region (plus a second-token disambiguator for
/// 3-token sequences, the common MPI-call shape); anything else falls back to `Sequence_<id>`.
fn guess_sequence_name(thread: &Thread, defs: &DefinitionTables, id: u32, seq: &Sequence) -> String {
    if seq.len() < 4 {
        if let Some(&first) = seq.tokens.first() {
            if first.is_event() {
                let summary = thread.event_summary(first).expect("validated at load time");
                let prefix = region_name(defs, summary.event.region);
                if seq.len() == 3 {
                    let second = token_string(thread, defs, seq.tokens[1]);
                    let comm = comm_name(defs, summary.event.comm);
                    let suffix = if comm.is_empty() { second } else { format!("{second}_{comm}") };
                    return format!("{prefix}_{suffix}");
                }
                return prefix;
            }
        }
    }
    format!("Sequence_{id}")
}

fn guess_loop_name(thread: &Thread, defs: &DefinitionTables, l: &Loop) -> String {
    let seq = thread.sequence(l.repeated_token).expect("Invariant 2: repeated_token is a Sequence");
    guess_sequence_name(thread, defs, l.repeated_token.id(), seq)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pallas_core::{CommRef, RecordKind, RegionRef};
    use pallas_writer::{
        archive_close, archive_new, global_archive_close, global_archive_new, record_event,
        thread_writer_new, thread_writer_close,
    };

    fn build_trace(root: &Path) {
        let global = global_archive_new();
        let archive = archive_new(&global);
        let region = archive.with_definitions(|defs| {
            let name = defs.strings.intern("main");
            defs.regions.push(pallas_core::RegionDef {
                name,
                source_file: pallas_core::StringRef::NONE,
            })
        });

        let mut writer = thread_writer_new(&archive);
        for i in 0..6 {
            let kind = if i % 2 == 0 { RecordKind::EnterRegion } else { RecordKind::LeaveRegion };
            record_event(&mut writer, kind, RegionRef::new(region.0), CommRef::NONE, i * 10, b"")
                .unwrap();
        }
        thread_writer_close(writer, &archive, 60).unwrap();
        archive_close(&archive).unwrap();
        global_archive_close(&global, root).unwrap();
    }

    fn default_options() -> Options {
        Options {
            show_definitions: false,
            list_archives: false,
            list_threads: false,
            thread_content: false,
            content: false,
            durations: false,
            archive_details: false,
            archive_filter: None,
            thread_filter: None,
        }
    }

    #[test]
    fn prints_trace_summary_without_panicking() {
        let dir = tempfile::tempdir().unwrap();
        build_trace(dir.path());
        let global = pallas_format::load_global(dir.path()).unwrap();
        let opts = Options { show_definitions: true, list_archives: true, list_threads: true, ..default_options() };
        print_trace(dir.path(), &global, &opts).unwrap();
    }

    #[test]
    fn prints_full_thread_content_without_panicking() {
        let dir = tempfile::tempdir().unwrap();
        build_trace(dir.path());
        let global = pallas_format::load_global(dir.path()).unwrap();
        let opts =
            Options { thread_content: true, content: true, durations: true, ..default_options() };
        print_trace(dir.path(), &global, &opts).unwrap();
    }

    #[test]
    fn archive_and_thread_filters_skip_nonmatching_ids() {
        let dir = tempfile::tempdir().unwrap();
        build_trace(dir.path());
        let global = pallas_format::load_global(dir.path()).unwrap();
        let opts = Options {
            list_threads: true,
            archive_filter: Some(99),
            thread_filter: Some(99),
            ..default_options()
        };
        print_trace(dir.path(), &global, &opts).unwrap();
    }

    #[test]
    fn a_sequence_occurring_more_than_once_gets_non_zero_occurrence_stats() {
        // build_trace's three (Enter region, Leave region) closings all share one region,
        // so the Enter/Leave Sequence recurs three times (eventually folded into a Loop, but
        // each real closing must still have recorded its own occurrence — spec.md §3).
        let dir = tempfile::tempdir().unwrap();
        build_trace(dir.path());
        let global = pallas_format::load_global(dir.path()).unwrap();
        let archive_id = global.archive_ids[0];
        let archive = pallas_format::load_archive(dir.path(), archive_id).unwrap();
        let thread_id = archive.thread_ids[0];
        let thread = pallas_format::load_thread(dir.path(), archive_id, thread_id).unwrap();

        let repeated = thread
            .sequences()
            .iter()
            .enumerate()
            .find(|(_, seq)| seq.len() == 2)
            .map(|(id, _)| id as u32)
            .expect("the Enter/Leave pair interned as a length-2 sequence");
        let occurrences = thread.sequence_occurrences(Token::sequence(repeated)).unwrap();
        assert_eq!(occurrences.occurrence_count(), 3);
        let stats = occurrences.durations.stats();
        assert_eq!(stats.size, 3);
        assert!(stats.mean > 0, "a real trace must not report zero duration for a recurring sequence");
    }

    #[test]
    fn guess_sequence_name_falls_back_for_long_sequences() {
        let thread = Thread::new(0, 0);
        let tokens: Vec<Token> = (0..5).map(Token::event).collect();
        let id = thread.sequences().len() as u32;
        let seq = Sequence::new(tokens);
        let defs = DefinitionTables::new();
        assert_eq!(guess_sequence_name(&thread, &defs, id, &seq), format!("Sequence_{id}"));
    }
}
