// src/submit/tickets.rs

//! Ticket and path lists handed to the job's transfer tool.
//!
//! - `output_ticket.list`: the output directory with its write ticket.
//! - `input_ticket.list`: every input that carries a read ticket.
//! - `input_path.list`: every input without one.
//!
//! A list is only written when it would have entries. The names of the
//! written files are recorded on the job, since the submit file and the
//! `job` file both refer to them.

use std::path::Path;

use crate::config::ConfigFile;
use crate::errors::Result;
use crate::fs::FileSystem;
use crate::model::JobDescription;
use crate::submit::templates::{Templates, TicketEntry};
use crate::submit::write_artifact;

pub const INPUT_TICKET_LIST: &str = "input_ticket.list";
pub const OUTPUT_TICKET_LIST: &str = "output_ticket.list";
pub const INPUT_PATH_LIST: &str = "input_path.list";

/// Which lists a builder wants.
#[derive(Debug, Clone, Copy)]
pub struct TicketListKinds {
    pub path_list: bool,
}

pub fn write_ticket_lists(
    job: &mut JobDescription,
    kinds: TicketListKinds,
    cfg: &ConfigFile,
    templates: &Templates,
    fs: &dyn FileSystem,
    dir: &Path,
) -> Result<()> {
    let ticket_header = cfg.tickets_path_list.file_identifier.as_str();

    if !job.output_dir_ticket.is_empty() {
        let contents =
            templates.output_ticket_list(ticket_header, &job.output_dir_ticket, &job.output_dir)?;
        write_artifact(fs, dir, OUTPUT_TICKET_LIST, contents.as_bytes())?;
        job.output_ticket_list = OUTPUT_TICKET_LIST.to_string();
    }

    let with_tickets: Vec<TicketEntry> = job
        .inputs_with_tickets()
        .into_iter()
        .map(|input| TicketEntry {
            ticket: input.ticket.clone(),
            path: input.irods_path(),
        })
        .collect();
    if !with_tickets.is_empty() {
        let contents = templates.input_ticket_list(ticket_header, &with_tickets)?;
        write_artifact(fs, dir, INPUT_TICKET_LIST, contents.as_bytes())?;
        job.input_ticket_list = INPUT_TICKET_LIST.to_string();
    }

    if kinds.path_list {
        let paths: Vec<String> = job
            .inputs_without_tickets()
            .into_iter()
            .map(|input| input.irods_path())
            .collect();
        if !paths.is_empty() {
            let contents = templates.input_path_list(&cfg.path_list.file_identifier, &paths)?;
            write_artifact(fs, dir, INPUT_PATH_LIST, contents.as_bytes())?;
            job.input_path_list = INPUT_PATH_LIST.to_string();
        }
    }

    Ok(())
}
