//! Line-oriented console shell - Drives the registry from stdin
//!
//! The shell only calls registry operations and prints what it observes; it
//! never touches instance state directly.

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

use crate::core::{
    ConfirmGate, DeleteMode, FileId, InstanceEvent, InstanceId, InstanceRegistry, ProjectRequest,
    Template,
};

const HELP: &str = "\
Instances:  list | select <id> | create <template> <name> | remove | templates
Power:      start | stop | restart | status
Console:    > <input> | logs | clear | startup <command>
Files:      ls [path] | mkdir <path> <name> | touch <path> <name> [content]
            upload <path> <name> <bytes> | edit <file-id> <content>
            rm <file-id> | rm -r <file-id> | unzip <file-id> | orphans
Profile:    profile | profile <name>
            help | quit";

/// Runtime templates offered by `create`. The first version is the one deployed.
pub fn catalog() -> Vec<Template> {
    let template = |id: &str, icon: &str, versions: &[&str]| Template {
        id: id.to_string(),
        icon: icon.to_string(),
        image: format!("ghcr.io/yolks/{}", id),
        versions: versions.iter().map(|v| v.to_string()).collect(),
    };

    vec![
        template("nodejs", "JS", &["16", "18", "20", "21", "22"]),
        template("python", "PY", &["3.8", "3.9", "3.10", "3.11", "3.12"]),
        template("java", "JV", &["8", "11", "17", "21"]),
        template("bun", "BN", &["1.0", "1.1"]),
        template("go", "GO", &["1.19", "1.20", "1.21", "1.22"]),
        template("rust", "RS", &["1.70", "1.75", "1.78"]),
        template("php", "PH", &["7.4", "8.0", "8.1", "8.2", "8.3"]),
        template("ruby", "RB", &["2.7", "3.0", "3.1", "3.2"]),
        template("deno", "DN", &["1.30", "1.40", "1.45"]),
    ]
}

pub struct Shell {
    registry: InstanceRegistry,
    selected: Option<InstanceId>,
    input: Lines<BufReader<Stdin>>,
}

impl Shell {
    pub fn new(registry: InstanceRegistry) -> Self {
        Self {
            registry,
            selected: None,
            input: BufReader::new(tokio::io::stdin()).lines(),
        }
    }

    /// Read and execute lines until `quit` or end of input
    pub async fn run(mut self) -> Result<()> {
        spawn_event_printer(&self.registry);

        if let Some(first) = self.registry.list_instances().await.first() {
            self.selected = Some(first.id.clone());
        }
        println!("{}\n", HELP);

        loop {
            let Some(line) = self.input.next_line().await? else {
                break;
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if line == "quit" || line == "exit" {
                break;
            }

            if let Err(e) = self.execute(line).await {
                println!("error: {:#}", e);
            }
        }

        Ok(())
    }

    fn selected(&self) -> Result<&InstanceId> {
        self.selected
            .as_ref()
            .context("no instance selected; use `select <id>`")
    }

    async fn confirm(&mut self, prompt: &str) -> Result<bool> {
        ask(&mut self.input, prompt).await
    }

    async fn execute(&mut self, line: &str) -> Result<()> {
        if let Some(input) = line.strip_prefix('>') {
            let id = self.selected()?.clone();
            self.registry.send_command(&id, input).await?;
            return Ok(());
        }

        let (verb, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();
        let args: Vec<&str> = rest.split_whitespace().collect();
        debug!("Shell command {} {:?}", verb, args);

        match verb {
            "help" => println!("{}", HELP),
            "templates" => {
                for t in catalog() {
                    println!("  {:<8} {:<3} {} ({})", t.id, t.icon, t.image, t.versions.join(", "));
                }
            }
            "list" => {
                for instance in self.registry.list_instances().await {
                    let marker = if self.selected.as_ref() == Some(&instance.id) { "*" } else { " " };
                    println!(
                        "{} {}  {:<20} {:<9} {}  cpu {}%  ram {}/{} MB",
                        marker,
                        instance.id,
                        instance.name,
                        instance.status.label(),
                        instance.network,
                        instance.resources.cpu,
                        instance.resources.ram_usage,
                        instance.resources.max_ram
                    );
                }
            }
            "select" => {
                let id = InstanceId::from(rest);
                self.registry.instance(&id).await?;
                self.selected = Some(id);
            }
            "create" => {
                let [template_id, ..] = args.as_slice() else {
                    bail!("usage: create <template> <name>");
                };
                let template = catalog()
                    .into_iter()
                    .find(|t| t.id == *template_id)
                    .with_context(|| format!("unknown template {}", template_id))?;
                let name = rest[template_id.len()..].trim().to_string();
                let id = self.registry.create_project(ProjectRequest {
                    name,
                    template,
                    ram_limit_mb: 2048,
                    disk_limit: "10 GB".to_string(),
                })?;
                println!("created {}", id);
                self.selected = Some(id);
            }
            "remove" => {
                let id = self.selected()?.clone();
                if self.confirm(&format!("Delete instance {}?", id)).await? {
                    self.registry.delete_instance(&id).await?;
                    self.selected = None;
                }
            }
            "start" | "stop" | "restart" | "status" => {
                let id = self.selected()?.clone();
                let status = match verb {
                    "start" => self.registry.start(&id).await?,
                    "stop" => self.registry.stop(&id).await?,
                    "restart" => self.registry.restart(&id).await?,
                    _ => self.registry.instance(&id).await?.status,
                };
                println!("{}: {}", id, status);
            }
            "logs" => {
                let id = self.selected()?.clone();
                for line in self.registry.instance(&id).await?.logs.render() {
                    println!("{}", line);
                }
            }
            "clear" => {
                let id = self.selected()?.clone();
                self.registry.clear_logs(&id).await?;
            }
            "startup" => {
                let id = self.selected()?.clone();
                let runtime = self.registry.instance(&id).await?.runtime;
                self.registry
                    .update_startup(&id, rest, &runtime.image, &runtime.version)
                    .await?;
            }
            "ls" => {
                let id = self.selected()?.clone();
                let path = if rest.is_empty() { "/" } else { rest };
                for item in self.registry.list_files(&id, path).await? {
                    let kind = if item.is_directory { "d" } else { "-" };
                    println!(
                        "{} {:<12} {:>9}  {:<16} {}",
                        kind,
                        item.id.0,
                        item.size.to_string(),
                        item.modified,
                        item.name
                    );
                }
            }
            "mkdir" | "touch" => {
                let id = self.selected()?.clone();
                let [path, name, content @ ..] = args.as_slice() else {
                    bail!("usage: {} <path> <name>", verb);
                };
                let content = (!content.is_empty()).then(|| content.join(" "));
                let file = self
                    .registry
                    .create_file(&id, path, name, verb == "mkdir", content)
                    .await?;
                println!("created {}", file);
            }
            "upload" => {
                let id = self.selected()?.clone();
                let [path, name, bytes] = args.as_slice() else {
                    bail!("usage: upload <path> <name> <bytes>");
                };
                let bytes: u64 = bytes.parse().context("byte count must be a number")?;
                let file = self.registry.upload_file(&id, path, name, bytes).await?;
                println!("uploaded {}", file);
            }
            "edit" => {
                let id = self.selected()?.clone();
                let Some((file, content)) = rest.split_once(char::is_whitespace) else {
                    bail!("usage: edit <file-id> <content>");
                };
                let content = content.replace("\\n", "\n");
                if !self.registry.update_file(&id, &FileId::from(file), &content).await? {
                    println!("nothing to update");
                }
            }
            "rm" => {
                let id = self.selected()?.clone();
                let (mode, file) = match args.as_slice() {
                    ["-r", file] => (DeleteMode::Tree, FileId::from(*file)),
                    [file] => (DeleteMode::Single, FileId::from(*file)),
                    _ => bail!("usage: rm [-r] <file-id>"),
                };
                let mut gate = InputGate {
                    input: &mut self.input,
                };
                if !self.registry.delete_file(&id, &file, mode, &mut gate).await? {
                    println!("nothing deleted");
                }
            }
            "orphans" => {
                let id = self.selected()?.clone();
                for item in self.registry.orphans(&id).await? {
                    println!("  {:<12} {}/{}", item.id.0, item.path.trim_end_matches('/'), item.name);
                }
            }
            "unzip" => {
                let id = self.selected()?.clone();
                self.registry.unzip(&id, &FileId::from(rest)).await?;
            }
            "profile" => {
                if rest.is_empty() {
                    let profile = self.registry.profile();
                    println!("{} - {}\n{}", profile.name, profile.bio, profile.avatar);
                } else {
                    let mut profile = self.registry.profile();
                    profile.name = rest.to_string();
                    self.registry.update_profile(profile);
                }
            }
            other => bail!("unknown command `{}`; try `help`", other),
        }

        Ok(())
    }
}

async fn ask(input: &mut Lines<BufReader<Stdin>>, prompt: &str) -> Result<bool> {
    println!("{} [y/N]", prompt);
    let answer = input.next_line().await?.unwrap_or_default();
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

/// Answers delete confirmations from the shell's own input
struct InputGate<'a> {
    input: &'a mut Lines<BufReader<Stdin>>,
}

impl ConfirmGate for InputGate<'_> {
    async fn confirm(&mut self, prompt: &str) -> bool {
        ask(self.input, prompt).await.unwrap_or_else(|e| {
            debug!("Confirmation read failed: {}", e);
            false
        })
    }
}

/// Print live console output of every instance as it arrives
fn spawn_event_printer(registry: &InstanceRegistry) {
    let mut events = registry.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(InstanceEvent::LogAppended { id, entry }) => {
                    println!("[{}] {}", id, entry.render());
                }
                Ok(InstanceEvent::StatusChanged { id, status }) => {
                    println!("[{}] status: {}", id, status);
                }
                Ok(InstanceEvent::Removed(id)) => println!("[{}] removed", id),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    debug!("Event printer skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}
