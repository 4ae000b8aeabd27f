use std::env;

use atty::Stream;
use chrono::{DateTime, Local};
use owo_colors::OwoColorize;
use sysinfo::System;

use crate::config::Settings;

/// Полный баннер с информацией о процессе.
pub const ASCII_FULL: &str = r#"
    Chanbus {version}
    ----------------------------------------------
    Mode:             {mode}
    Runtime:          Lua 5.4
    Scripts:          {scripts}
    Default capacity: {capacity}
    PID:              {pid}
    Host:             {host}
    OS/Arch:          {os}/{arch}
    CPU(s):           {cpus}
    Memory:           {mem_value} {mem_unit}
    Build:            {git} ({build_time})
"#;

/// Компактный баннер.
pub const ASCII_COMPACT: &str = "Chanbus {version} | {mode} | {scripts} script(s) | PID {pid}";

/// Печатает баннер в stderr.
///
/// `CHANBUS_BANNER=full|compact|off`; по умолчанию debug-сборка печатает
/// полный вариант, release: компактный.
pub fn print_banner(settings: &Settings) {
    let full = match env::var("CHANBUS_BANNER").ok().as_deref() {
        Some("off") => return,
        Some("full") => true,
        Some("compact") => false,
        _ => cfg!(debug_assertions),
    };

    let bits = std::mem::size_of::<usize>() * 8;
    let version = format!("{} ({bits}-bit)", env!("CARGO_PKG_VERSION"));
    let mode = if cfg!(debug_assertions) {
        "debug"
    } else {
        "release"
    };
    let pid = std::process::id().to_string();
    let scripts = settings.scripts.len().to_string();
    let color = atty::is(Stream::Stderr);

    if !full {
        let line = ASCII_COMPACT
            .replace("{version}", &version)
            .replace("{mode}", mode)
            .replace("{scripts}", &scripts)
            .replace("{pid}", &pid);
        if color {
            eprintln!("{}", line.bold().green());
        } else {
            eprintln!("{line}");
        }
        return;
    }

    let mut sys = System::new();
    sys.refresh_memory();
    let (mem_value, mem_unit) = human_memory(sys.total_memory());
    let capacity = match settings.default_capacity {
        0 => "unbounded".to_string(),
        n => n.to_string(),
    };

    let s = ASCII_FULL
        .replace("{version}", &version)
        .replace("{mode}", mode)
        .replace("{scripts}", &scripts)
        .replace("{capacity}", &capacity)
        .replace("{pid}", &pid)
        .replace(
            "{host}",
            &System::host_name().unwrap_or_else(|| "unknown".into()),
        )
        .replace("{os}", env::consts::OS)
        .replace("{arch}", env::consts::ARCH)
        .replace("{cpus}", &num_cpus::get().to_string())
        .replace("{mem_value}", &format!("{mem_value:.1}"))
        .replace("{mem_unit}", mem_unit)
        .replace("{git}", option_env!("GIT_COMMIT").unwrap_or("unknown"))
        .replace("{build_time}", &build_time());

    if !color {
        eprintln!("{s}");
        return;
    }
    for (i, line) in s.lines().enumerate() {
        let trimmed = line.trim_start();
        if i == 1 {
            eprintln!("{}", line.bold().bright_blue());
        } else if trimmed.starts_with("Mode:") {
            eprintln!("{}", line.replace(mode, &mode.cyan().to_string()));
        } else if trimmed.starts_with("PID:") {
            eprintln!("{}", line.replace(&pid, &pid.magenta().to_string()));
        } else if trimmed.starts_with("Build:") {
            eprintln!("{}", line.dimmed());
        } else {
            eprintln!("{line}");
        }
    }
}

/// Объём памяти в байтах в читаемом виде.
fn human_memory(bytes: u64) -> (f64, &'static str) {
    let kb = bytes as f64 / 1024.0;
    let mb = kb / 1024.0;
    let gb = mb / 1024.0;
    if gb >= 1.0 {
        (gb, "GB")
    } else if mb >= 1.0 {
        (mb, "MB")
    } else {
        (kb, "KB")
    }
}

fn build_time() -> String {
    let raw = option_env!("BUILD_TIME").unwrap_or("unknown");
    match DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => dt
            .with_timezone(&Local)
            .format("%d.%m.%Y %H:%M:%S")
            .to_string(),
        Err(_) => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_human_memory_units() {
        assert_eq!(human_memory(512 * 1024).1, "KB");
        assert_eq!(human_memory(3 * 1024 * 1024).1, "MB");
        let (v, unit) = human_memory(2 * 1024 * 1024 * 1024);
        assert_eq!(unit, "GB");
        assert!((v - 2.0).abs() < f64::EPSILON);
    }
}
