#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

pub const QHIST_HEADER: &str = "Job ID,User,Queue,Nodes,NCPUs,Req Mem,Used Mem,Job Start,Job End,Elapsed,Walltime,Wait Time,Job Name,Avg CPU,Resources,Exit Status";

/// One completed job as `qhist -c` prints it.
pub struct QhistJob<'a> {
    pub id: &'a str,
    pub user: &'a str,
    pub queue: &'a str,
    pub req_gb: f64,
    pub used_gb: f64,
    pub end: &'a str,
    pub elapsed_h: f64,
    pub cpu: f64,
    pub name: &'a str,
}

impl QhistJob<'_> {
    pub fn line(&self) -> String {
        format!(
            "{},{},{},1,4,{},{},{}T00:00:00,{}T12:00:00,{},12.0,0.1,{},{},\"ncpus=4,mem={}GB\",0",
            self.id,
            self.user,
            self.queue,
            self.req_gb,
            self.used_gb,
            self.end,
            self.end,
            self.elapsed_h,
            self.name,
            self.cpu,
            self.req_gb
        )
    }
}

pub fn job<'a>(id: &'a str, user: &'a str, req_gb: f64, used_gb: f64, elapsed_h: f64) -> QhistJob<'a> {
    QhistJob {
        id,
        user,
        queue: "casper",
        req_gb,
        used_gb,
        end: "2024-03-04",
        elapsed_h,
        cpu: 50.0,
        name: "dask-worker",
    }
}

pub fn qhist_log(jobs: &[QhistJob<'_>]) -> String {
    let mut log = String::from(QHIST_HEADER);
    log.push('\n');
    for job in jobs {
        log.push_str(&job.line());
        log.push('\n');
    }
    log
}

/// The three alice jobs: 25/5 GB for 2 h, 25/0 GB for 1 h, 10/10 GB for 0.5 h.
pub fn alice_jobs() -> Vec<QhistJob<'static>> {
    vec![
        job("1001", "alice", 25.0, 5.0, 2.0),
        job("1002", "alice", 25.0, 0.0, 1.0),
        job("1003", "alice", 10.0, 10.0, 0.5),
    ]
}

pub fn write_log(dir: &Path, filename: &str, content: &str) -> PathBuf {
    let path = dir.join(filename);
    fs::write(&path, content).unwrap();
    path
}
