//! Pre-built mock process tables for testing.
//!
//! These scenarios provide realistic `/proc` states around an inference
//! server: a lone server, a duplicate instance, and unrelated neighbours.

use super::filesystem::MockFs;

/// PID of the server process in the stock scenarios.
pub const LLAMA_PID: u32 = 4242;

/// Description of one mocked process, rendered into `/proc/[pid]/` files.
#[derive(Debug, Clone)]
pub struct MockProcess {
    pub pid: u32,
    pub comm: String,
    pub args: Vec<String>,
    pub utime: u64,
    pub stime: u64,
    pub starttime: u64,
    pub rss_kb: Option<u64>,
}

impl MockProcess {
    pub fn new(pid: u32, args: &[&str]) -> Self {
        let comm = args
            .first()
            .map(|a| a.rsplit('/').next().unwrap_or(a))
            .unwrap_or("?")
            .chars()
            .take(15)
            .collect();
        Self {
            pid,
            comm,
            args: args.iter().map(|a| a.to_string()).collect(),
            utime: 0,
            stime: 0,
            starttime: 1000 + pid as u64,
            rss_kb: Some(1024),
        }
    }

    pub fn cpu(mut self, utime: u64, stime: u64) -> Self {
        self.utime = utime;
        self.stime = stime;
        self
    }

    pub fn started_at(mut self, starttime: u64) -> Self {
        self.starttime = starttime;
        self
    }

    pub fn rss_kb(mut self, rss_kb: Option<u64>) -> Self {
        self.rss_kb = rss_kb;
        self
    }

    fn stat(&self) -> String {
        let rss_pages = self.rss_kb.unwrap_or(0) / 4;
        format!(
            "{} ({}) S 1 {} {} 0 -1 4194560 100 0 0 0 {} {} 0 0 20 0 4 0 {} 1000000 {} 18446744073709551615 0 0 0 0 0 0 0 0 0 0 0 0 17 0 0 0 0 0 0",
            self.pid, self.comm, self.pid, self.pid, self.utime, self.stime, self.starttime, rss_pages
        )
    }

    fn status(&self) -> String {
        let mut status = format!("Name:\t{}\nPid:\t{}\nPPid:\t1\n", self.comm, self.pid);
        if let Some(rss) = self.rss_kb {
            status.push_str(&format!("VmRSS:\t{:>8} kB\n", rss));
        }
        status
    }

    fn cmdline(&self) -> String {
        let mut cmdline = self.args.join("\0");
        cmdline.push('\0');
        cmdline
    }
}

impl MockFs {
    /// Writes (or overwrites) the `/proc/[pid]/` files of `process`.
    pub fn put_process(&mut self, process: &MockProcess) {
        self.add_process(
            process.pid,
            &process.stat(),
            &process.status(),
            &process.cmdline(),
        );
    }

    /// Host with init, a shell, and one `llama-server` at [`LLAMA_PID`].
    pub fn llama_host() -> Self {
        let mut fs = Self::new();
        fs.add_file("/proc/uptime", "12345.67 98765.43\n");
        fs.put_process(&MockProcess::new(1, &["/sbin/init"]));
        fs.put_process(&MockProcess::new(1000, &["-bash"]));
        fs.put_process(&Self::llama_server(LLAMA_PID));
        fs
    }

    /// Host running two server instances; the older one has the higher PID.
    pub fn duplicate_llama_host() -> Self {
        let mut fs = Self::llama_host();
        fs.put_process(&Self::llama_server(LLAMA_PID + 100).started_at(500));
        fs
    }

    /// Host where the server is not running.
    pub fn idle_host() -> Self {
        let mut fs = Self::new();
        fs.put_process(&MockProcess::new(1, &["/sbin/init"]));
        fs.put_process(&MockProcess::new(1000, &["-bash"]));
        fs
    }

    /// A `llama-server` invocation as launched by the container entrypoint.
    pub fn llama_server(pid: u32) -> MockProcess {
        MockProcess::new(
            pid,
            &[
                "/app/llama-server",
                "-m",
                "/models/model.gguf",
                "--host",
                "0.0.0.0",
                "--port",
                "8080",
            ],
        )
        .cpu(1500, 300)
        .rss_kb(Some(480_000))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::procfs::parser::{parse_cmdline, parse_proc_stat, parse_proc_status};
    use crate::collector::traits::FileSystem;
    use std::path::Path;

    #[test]
    fn test_mock_process_files_parse() {
        let fs = MockFs::llama_host();

        let stat = fs
            .read_to_string(Path::new("/proc/4242/stat"))
            .unwrap();
        let stat = parse_proc_stat(&stat).unwrap();
        assert_eq!(stat.pid, LLAMA_PID);
        assert_eq!(stat.comm, "llama-server");
        assert_eq!(stat.utime, 1500);
        assert_eq!(stat.stime, 300);

        let status = fs
            .read_to_string(Path::new("/proc/4242/status"))
            .unwrap();
        assert_eq!(parse_proc_status(&status).unwrap().vm_rss, Some(480_000));

        let cmdline = fs
            .read_to_string(Path::new("/proc/4242/cmdline"))
            .unwrap();
        assert_eq!(parse_cmdline(&cmdline)[0], "/app/llama-server");
    }
}
