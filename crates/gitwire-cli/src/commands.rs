//! CLI command implementations.

use anyhow::{bail, Context as _, Result};
use gitwire_protocol::{
    AdvRefs, Endpoint, ObjectId, RefUpdateCommand, ReferenceUpdateRequest, UploadPackRequest,
};
use gitwire_transport::{AuthMethod, Client, TransportConfig};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Settings shared by every command.
pub struct Context {
    client: Client,
    auth: Option<AuthMethod>,
}

impl Context {
    /// Loads the transport config and resolves credentials.
    pub fn new(
        config: Option<&Path>,
        user: Option<String>,
        password: Option<String>,
        token: Option<String>,
    ) -> Result<Self> {
        let config = match config {
            Some(path) => TransportConfig::load(path)?,
            None => TransportConfig::default(),
        };
        tracing::debug!(?config, "transport configuration");
        Ok(Self {
            client: Client::new(&config)?,
            auth: auth_method(user, password, token),
        })
    }

    /// List the references a remote advertises.
    pub fn ls_remote(&self, url: &str, push: bool, json: bool) -> Result<()> {
        let endpoint = parse_endpoint(url)?;
        let adv = if push {
            let mut session = self
                .client
                .new_send_pack_session(&endpoint, self.auth.clone())?;
            let adv = session.advertised_references()?.clone();
            session.close()?;
            adv
        } else {
            let mut session = self
                .client
                .new_fetch_pack_session(&endpoint, self.auth.clone())?;
            let adv = session.advertised_references()?.clone();
            session.close()?;
            adv
        };

        let stdout = io::stdout();
        let mut out = stdout.lock();
        if json {
            serde_json::to_writer_pretty(&mut out, &advertisement_json(&adv))?;
            writeln!(out)?;
        } else {
            for (id, name) in ref_lines(&adv) {
                writeln!(out, "{id}\t{name}")?;
            }
            eprintln!("capabilities: {}", adv.capabilities);
        }
        Ok(())
    }

    /// Download a pack from a remote.
    pub fn fetch_pack(
        &self,
        url: &str,
        wants: &[String],
        haves: &[String],
        depth: Option<u32>,
        output: Option<&Path>,
    ) -> Result<()> {
        let endpoint = parse_endpoint(url)?;
        let mut session = self
            .client
            .new_fetch_pack_session(&endpoint, self.auth.clone())?;
        let adv = session.advertised_references()?;

        let mut request = UploadPackRequest::for_server(&adv.capabilities);
        for want in wants {
            request = request.want(resolve(adv, want)?);
        }
        for have in haves {
            request = request.have(parse_id(have)?);
        }
        if let Some(depth) = depth {
            request = request.depth(depth);
        }

        let mut response = session.fetch_pack(&request)?;
        for id in &response.shallow_update.shallows {
            eprintln!("shallow {id}");
        }
        let written = match output {
            Some(path) => {
                let file = File::create(path)
                    .with_context(|| format!("failed to create {}", path.display()))?;
                let mut writer = BufWriter::new(file);
                let n = io::copy(&mut response, &mut writer)?;
                writer.flush()?;
                n
            }
            None => io::copy(&mut response, &mut io::stdout().lock())?,
        };
        drop(response);
        session.close()?;
        tracing::info!(bytes = written, "pack received");
        Ok(())
    }

    /// Update references on a remote.
    pub fn send_pack(&self, url: &str, updates: &[String], pack: Option<&Path>) -> Result<()> {
        let endpoint = parse_endpoint(url)?;
        let mut session = self
            .client
            .new_send_pack_session(&endpoint, self.auth.clone())?;
        let adv = session.advertised_references()?;

        let mut request = ReferenceUpdateRequest::for_server(&adv.capabilities);
        for update in updates {
            request = request.command(parse_update(update)?);
        }
        if let Some(path) = pack {
            let file =
                File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
            request = request.with_pack(io::BufReader::new(file));
        }

        let report = session.send_pack(request)?;
        session.close()?;

        println!("unpack {}", report.unpack_status);
        for status in &report.command_statuses {
            if status.is_ok() {
                println!("ok {}", status.ref_name);
            } else {
                println!("ng {} {}", status.ref_name, status.status);
            }
        }
        report.error()?;
        Ok(())
    }
}

fn auth_method(
    user: Option<String>,
    password: Option<String>,
    token: Option<String>,
) -> Option<AuthMethod> {
    match (token, user) {
        (Some(token), _) => Some(AuthMethod::token(token)),
        (None, Some(user)) => Some(AuthMethod::basic(user, password.unwrap_or_default())),
        (None, None) => None,
    }
}

fn parse_endpoint(url: &str) -> Result<Endpoint> {
    Endpoint::parse(url).with_context(|| format!("invalid repository address {url:?}"))
}

fn parse_id(s: &str) -> Result<ObjectId> {
    s.parse()
        .with_context(|| format!("invalid object id {s:?}"))
}

/// Resolves an object id, `HEAD` or an advertised reference name.
fn resolve(adv: &AdvRefs, want: &str) -> Result<ObjectId> {
    if want.len() == ObjectId::HEX_LEN {
        if let Ok(id) = want.parse() {
            return Ok(id);
        }
    }
    if want == "HEAD" {
        return adv.head.context("remote does not advertise HEAD");
    }
    for name in [want.to_string(), format!("refs/heads/{want}"), format!("refs/tags/{want}")] {
        if let Some(id) = adv.references.get(&name) {
            return Ok(*id);
        }
    }
    bail!("no such remote reference: {want}")
}

/// Parses `<old>:<new>:<ref>`; an empty id means zero (create or delete).
fn parse_update(s: &str) -> Result<RefUpdateCommand> {
    let mut parts = s.splitn(3, ':');
    let (Some(old), Some(new), Some(name)) = (parts.next(), parts.next(), parts.next()) else {
        bail!("update must be <old>:<new>:<ref>, got {s:?}");
    };
    let id = |hex: &str| {
        if hex.is_empty() {
            Ok(ObjectId::zero())
        } else {
            parse_id(hex)
        }
    };
    Ok(RefUpdateCommand::new(id(old)?, id(new)?, name))
}

/// Advertisement lines in `git ls-remote` order.
fn ref_lines(adv: &AdvRefs) -> Vec<(ObjectId, String)> {
    let mut lines = Vec::new();
    if let Some(head) = adv.head {
        lines.push((head, "HEAD".to_string()));
    }
    for (name, id) in &adv.references {
        lines.push((*id, name.clone()));
        if let Some(peeled) = adv.peeled.get(name) {
            lines.push((*peeled, format!("{name}^{{}}")));
        }
    }
    lines
}

fn advertisement_json(adv: &AdvRefs) -> serde_json::Value {
    let refs: serde_json::Map<String, serde_json::Value> = adv
        .references
        .iter()
        .map(|(name, id)| (name.clone(), id.to_hex().into()))
        .collect();
    let capabilities: Vec<String> = adv
        .capabilities
        .iter()
        .map(|(name, value)| match value {
            Some(value) => format!("{name}={value}"),
            None => name.to_string(),
        })
        .collect();
    serde_json::json!({
        "head": adv.head.map(|id| id.to_hex()),
        "refs": refs,
        "peeled": adv.peeled.iter().map(|(k, v)| (k.clone(), v.to_hex())).collect::<std::collections::BTreeMap<_, _>>(),
        "symrefs": adv.symrefs(),
        "capabilities": capabilities,
    })
}
