//! Terminal output of display frames.

use anyhow::{Context, Result};
use herakles_proc_monitor::format::{format_cpu_time, format_memory_and_delta, format_percentage};
use herakles_proc_monitor::{DisplayFrame, ProcessRow, ThreadDelta};
use std::fmt::Write as FmtWrite;

use crate::cli::OutputFormat;

const NAME_W: usize = 44;
const MEM_W: usize = 22;
const CPU_W: usize = 22;
const PID_W: usize = 8;

/// Renders a frame in the configured format.
pub fn render_frame(frame: &DisplayFrame, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Table => render_table(frame),
        OutputFormat::Json => serde_json::to_string(frame).context("Failed to encode frame as JSON"),
    }
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(width.saturating_sub(1)).collect();
        out.push('…');
        out
    }
}

fn cpu_cell(slope: Option<f64>, total_ns: u64) -> Result<String> {
    Ok(format!(
        "{} ({}ms)",
        format_percentage(slope)?,
        format_cpu_time(total_ns)
    ))
}

fn process_line(out: &mut String, row: &ProcessRow) -> Result<()> {
    let p = &row.process;
    let twisty = match (p.threads.is_empty(), row.is_open) {
        (true, _) => ' ',
        (false, true) => '▾',
        (false, false) => '▸',
    };
    let mut name = format!("{} ({})", p.name(), p.process_type);
    if row.is_hung {
        name.push_str(" [hung]");
    }
    let memory = format_memory_and_delta(Some(p.total_resident_size), p.delta_resident_size)?;

    writeln!(
        out,
        "{} {:name_w$} {:>mem_w$} {:>cpu_w$} {:>pid_w$} {:>7}",
        twisty,
        truncate(&name, NAME_W),
        memory.to_string(),
        cpu_cell(p.slope_cpu, p.total_cpu)?,
        p.pid,
        p.threads.len(),
        name_w = NAME_W,
        mem_w = MEM_W,
        cpu_w = CPU_W,
        pid_w = PID_W,
    )?;
    Ok(())
}

fn thread_line(out: &mut String, thread: &ThreadDelta) -> Result<()> {
    writeln!(
        out,
        "    {:name_w$} {:>mem_w$} {:>cpu_w$} {:>pid_w$}",
        truncate(&thread.name, NAME_W - 2),
        "",
        cpu_cell(thread.slope_cpu, thread.total_cpu)?,
        thread.tid,
        name_w = NAME_W - 2,
        mem_w = MEM_W,
        cpu_w = CPU_W,
        pid_w = PID_W,
    )?;
    Ok(())
}

/// Plain-text table, one line per process and per visible thread.
pub fn render_table(frame: &DisplayFrame) -> Result<String> {
    let mut out = String::new();

    let sort = match frame.sort.column {
        Some(key) => format!(
            "{} {}",
            key,
            if frame.sort.ascending { "▲" } else { "▼" }
        ),
        None => "default".to_string(),
    };
    writeln!(out, "{} processes, sorted by {}", frame.rows.len(), sort)?;
    writeln!(
        out,
        "  {:name_w$} {:>mem_w$} {:>cpu_w$} {:>pid_w$} {:>7}",
        "Name",
        "Memory",
        "CPU",
        "PID",
        "Threads",
        name_w = NAME_W,
        mem_w = MEM_W,
        cpu_w = CPU_W,
        pid_w = PID_W,
    )?;
    let width = 2 + NAME_W + 1 + MEM_W + 1 + CPU_W + 1 + PID_W + 8;
    writeln!(out, "{}", "=".repeat(width))?;

    for row in &frame.rows {
        process_line(&mut out, row)?;
        for thread in row.visible_threads() {
            thread_line(&mut out, thread)?;
        }
        if row.separate_from_next_group {
            writeln!(out, "{}", "-".repeat(width))?;
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use herakles_proc_monitor::{ProcessDelta, ProcessType, SortState};

    fn row(pid: u32, process_type: ProcessType, open: bool, separate: bool) -> ProcessRow {
        ProcessRow {
            process: ProcessDelta {
                pid,
                child_id: Some(pid as u64),
                filename: "content".into(),
                display_rank: process_type.display_rank(),
                process_type,
                origin: String::new(),
                total_virtual_memory_size: 0,
                delta_virtual_memory_size: Some(0),
                total_resident_size: 2048,
                delta_resident_size: Some(1024),
                total_cpu_user: 1_500_000_000,
                slope_cpu_user: Some(0.5),
                total_cpu_kernel: 0,
                slope_cpu_kernel: Some(0.0),
                total_cpu: 1_500_000_000,
                slope_cpu: Some(0.5),
                threads: vec![ThreadDelta {
                    tid: pid,
                    name: "Main".into(),
                    total_cpu_user: 1_000_000,
                    slope_cpu_user: None,
                    total_cpu_kernel: 0,
                    slope_cpu_kernel: None,
                    total_cpu: 1_000_000,
                    slope_cpu: None,
                }],
            },
            is_open: open,
            is_hung: false,
            separate_from_next_group: separate,
        }
    }

    #[test]
    fn table_shows_threads_of_open_rows_and_separators() {
        let frame = DisplayFrame {
            rows: vec![
                row(1, ProcessType::Browser, true, true),
                row(2, ProcessType::Web, false, false),
            ],
            sort: SortState::default(),
        };
        let text = render_table(&frame).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert!(lines[0].starts_with("2 processes, sorted by default"));
        assert!(lines[3].starts_with("▾ content (browser)"));
        assert!(lines[3].contains("2KB (+1KB)"));
        assert!(lines[3].contains("50% (1,500ms)"));
        assert!(lines[4].trim_start().starts_with("Main"));
        assert!(lines[4].contains("? (1ms)"));
        assert!(lines[5].starts_with("---"));
        assert!(lines[6].starts_with("▸ content (web)"));
        assert_eq!(lines.len(), 7);
    }

    #[test]
    fn json_output_is_one_object() {
        let frame = DisplayFrame {
            rows: vec![row(7, ProcessType::Web, false, false)],
            sort: SortState::default(),
        };
        let json = render_frame(&frame, OutputFormat::Json).unwrap();
        assert!(!json.contains('\n'));
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["rows"][0]["process"]["pid"], 7);
        assert_eq!(value["rows"][0]["process"]["type"], "web");
        assert_eq!(value["sort"]["column"], serde_json::Value::Null);
    }

    #[test]
    fn truncates_long_names() {
        assert_eq!(truncate("abcdef", 4), "abc…");
        assert_eq!(truncate("abc", 4), "abc");
    }
}
