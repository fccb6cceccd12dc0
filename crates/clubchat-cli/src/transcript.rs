//! Line-oriented rendering of the read model.
//!
//! The terminal is append-only, so [`Transcript`] remembers what it already
//! printed and writes only the difference between snapshots: new log entries
//! (under a day heading when the day changes), status transitions, and member
//! and directory changes. A log that no longer extends what was printed (the
//! history backfill replaced it) is printed again in full.

use std::{
    fmt,
    io::{self, Write},
};

use chrono::{DateTime, TimeZone, Utc};
use clubchat_client::{
    ANONYMOUS, Attribution, ConnectionStatus, DayLabel, LogEntry, RoomEpoch, RoomSnapshot,
};
use clubchat_proto::{MessageId, RoomDirectory, RoomMember};

/// Incremental printer of [`RoomSnapshot`]s.
pub struct Transcript<Tz: TimeZone> {
    tz: Tz,
    epoch: RoomEpoch,
    status: ConnectionStatus,
    printed: Vec<MessageId>,
    last_label: Option<DayLabel>,
    members: Vec<RoomMember>,
    directory: Option<RoomDirectory>,
}

impl<Tz: TimeZone> Transcript<Tz>
where
    Tz::Offset: fmt::Display,
{
    /// Transcript showing times in `tz`.
    pub fn new(tz: Tz) -> Self {
        Self {
            tz,
            epoch: RoomEpoch::default(),
            status: ConnectionStatus::default(),
            printed: Vec::new(),
            last_label: None,
            members: Vec::new(),
            directory: None,
        }
    }

    /// Write whatever changed since the previous call.
    pub fn render(
        &mut self,
        snapshot: &RoomSnapshot,
        now: DateTime<Utc>,
        out: &mut impl Write,
    ) -> io::Result<()> {
        if snapshot.epoch != self.epoch {
            self.epoch = snapshot.epoch;
            match &snapshot.target {
                Some(target) => {
                    writeln!(out, "== room {target} ==")?;
                    self.printed.clear();
                    self.last_label = None;
                    self.members.clear();
                },
                None => writeln!(out, "== room closed ==")?,
            }
        }

        if snapshot.status != self.status {
            self.status = snapshot.status;
            writeln!(out, "-- {} --", snapshot.status)?;
        }

        self.render_entries(snapshot, now, out)?;

        if snapshot.members != self.members {
            self.members.clone_from(&snapshot.members);
            if !self.members.is_empty() {
                write_members(&self.members, out)?;
            }
        }

        if snapshot.directory != self.directory {
            self.directory.clone_from(&snapshot.directory);
            if let Some(directory) = &self.directory {
                write_directory(directory, out)?;
            }
        }

        out.flush()
    }

    fn render_entries(
        &mut self,
        snapshot: &RoomSnapshot,
        now: DateTime<Utc>,
        out: &mut impl Write,
    ) -> io::Result<()> {
        let extends = snapshot.entries.len() >= self.printed.len()
            && snapshot
                .entries
                .iter()
                .zip(&self.printed)
                .all(|(entry, printed)| &entry.message.message_id == printed);
        if !extends {
            self.printed.clear();
            self.last_label = None;
        }

        let now = now.with_timezone(&self.tz);
        let mut index = 0;
        for section in snapshot.sections(&now) {
            for entry in section.entries {
                if index >= self.printed.len() {
                    if self.last_label != Some(section.label) {
                        writeln!(out, "--- {} ---", section.label)?;
                        self.last_label = Some(section.label);
                    }
                    self.write_entry(entry, out)?;
                }
                index += 1;
            }
        }

        self.printed = snapshot.entries.iter().map(|e| e.message.message_id.clone()).collect();
        Ok(())
    }

    fn write_entry(&self, entry: &LogEntry, out: &mut impl Write) -> io::Result<()> {
        let time = entry.message.created_at.as_ref().map_or_else(
            || "--:--".to_string(),
            |ts| ts.at().with_timezone(&self.tz).format("%H:%M").to_string(),
        );
        let text = &entry.message.message;
        match entry.attribution {
            Attribution::System => writeln!(out, "[{time}] * {text}"),
            Attribution::Own => writeln!(out, "[{time}] {} (you): {text}", entry.sender_name()),
            Attribution::Other | Attribution::Unknown => {
                writeln!(out, "[{time}] {}: {text}", entry.sender_name())
            },
        }
    }
}

fn write_members(members: &[RoomMember], out: &mut impl Write) -> io::Result<()> {
    let names: Vec<String> = members
        .iter()
        .map(|member| {
            let name = member.nickname.as_deref().unwrap_or(ANONYMOUS);
            if member.is_admin() { format!("{name} (admin)") } else { name.to_string() }
        })
        .collect();
    writeln!(out, "members ({}): {}", members.len(), names.join(", "))
}

fn write_directory(directory: &RoomDirectory, out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "rooms of {}:", directory.club_name)?;
    for room in &directory.chat_rooms {
        writeln!(out, "  {:>6}  {}", room.id, room.name)?;
    }
    if directory.can_create_rooms() {
        writeln!(out, "  (you can create rooms with /create)")?;
    }
    Ok(())
}
