use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use assert_cmd::Command;
use git2::{IndexAddOption, Repository, Signature};
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn write_file(path: &Path, content: &str) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    fs::write(path, content)?;
    Ok(())
}

struct Fixture {
    _td: TempDir,
    root: PathBuf,
    remote: PathBuf,
}

impl Fixture {
    /// A one-commit repo on `main` whose `origin` is a local bare repo.
    fn new() -> Result<Self> {
        let td = tempfile::tempdir()?;
        let root = td.path().join("work");
        let remote = td.path().join("remote.git");
        Repository::init_bare(&remote)?;

        write_file(&root.join("README.md"), "app\n")?;
        let repo = Repository::init(&root)?;
        let mut idx = repo.index()?;
        idx.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
        idx.write()?;
        let oid = idx.write_tree()?;
        let tree = repo.find_tree(oid)?;
        let sig = Signature::now("tagdeploy", "tagdeploy@example.com")?;
        let commit_oid = repo.commit(Some("HEAD"), &sig, &sig, "init", &tree, &[])?;
        let commit = repo.find_commit(commit_oid)?;
        let head_name = repo
            .head()
            .ok()
            .and_then(|h| h.name().map(|s| s.to_string()));
        if head_name.as_deref() != Some("refs/heads/main") {
            repo.branch("main", &commit, true)?;
            repo.set_head("refs/heads/main")?;
        }
        repo.remote("origin", remote.to_str().expect("utf-8 temp path"))?;

        Ok(Self {
            _td: td,
            root,
            remote,
        })
    }

    fn cmd(&self, jenkins_url: &str) -> Result<Command> {
        let mut cmd = Command::cargo_bin("tagdeploy")?;
        cmd.current_dir(&self.root);
        cmd.env("TAGDEPLOY_JENKINS_URL", jenkins_url);
        cmd.env_remove("TAGDEPLOY_JENKINS_TOKEN");
        cmd.env_remove("RUST_LOG");
        Ok(cmd)
    }
}

fn has_tag(repo_path: &Path, tag: &str) -> Result<bool> {
    let repo = Repository::open(repo_path)?;
    Ok(repo.refname_to_id(&format!("refs/tags/{}", tag)).is_ok())
}

async fn jenkins(probe_status: u16) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/job/app/"))
        .respond_with(ResponseTemplate::new(probe_status))
        .mount(&server)
        .await;
    server
}

#[test]
fn help_lists_flags() -> Result<()> {
    let output = Command::cargo_bin("tagdeploy")?.arg("--help").output()?;
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout)?;
    for flag in ["--allow-dirty", "--dry-run", "--env <ENV>", "--tag <TAG>", "--no-upload", "--live"] {
        assert!(stdout.contains(flag), "{flag} missing from:\n{stdout}");
    }
    Ok(())
}

#[test]
fn live_prod_is_refused_outside_any_repo() -> Result<()> {
    let td = tempfile::tempdir()?;
    let output = Command::cargo_bin("tagdeploy")?
        .current_dir(td.path())
        .env_remove("RUST_LOG")
        .args(["--live", "--env", "prod"])
        .output()?;
    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8(output.stderr)?;
    insta::assert_snapshot!(stderr, @r###"we don't have automatic certificate signing, so you'll need to make a non-live build, sign it manually and then make the signed version live manually
"###);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn dry_run_prints_build_url_without_tagging() -> Result<()> {
    let fx = Fixture::new()?;
    let server = jenkins(200).await;
    Mock::given(method("GET"))
        .and(path("/job/app/buildWithParameters"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let output = fx
        .cmd(&format!("{}/job/app/", server.uri()))?
        .args(["-a", "-n", "-t", "release-42", "--no-upload"])
        .output()?;
    assert!(
        output.status.success(),
        "status: {:?}\nstderr: {}",
        output.status,
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8(output.stdout)?;
    let expected_url = format!(
        "{}/job/app/buildWithParameters?token=uBC3kFJF&ENV=dev&TAG=release-42&UPLOAD=false\n",
        server.uri()
    );
    assert_eq!(
        stdout,
        format!("{}dry-run: not triggering build for release-42\n", expected_url)
    );
    assert!(!has_tag(&fx.root, "release-42")?);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn unreachable_jenkins_aborts_before_tagging() -> Result<()> {
    let fx = Fixture::new()?;
    let server = jenkins(503).await;

    let output = fx
        .cmd(&format!("{}/job/app/", server.uri()))?
        .args(["-a", "-t", "release-42"])
        .output()?;
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8(output.stderr)?;
    assert!(stderr.contains("did you forget to connect to the VPN?"), "{stderr}");
    assert!(stderr.contains("503"), "{stderr}");
    assert!(!has_tag(&fx.root, "release-42")?);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn full_run_pushes_tag_and_triggers_build() -> Result<()> {
    let fx = Fixture::new()?;
    let server = jenkins(200).await;
    Mock::given(method("GET"))
        .and(path("/job/app/buildWithParameters"))
        .and(query_param("token", "uBC3kFJF"))
        .and(query_param("ENV", "staging"))
        .and(query_param("TAG", "release-42"))
        .and(query_param("UPLOAD", "true"))
        .and(query_param("LIVE", "true"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let output = fx
        .cmd(&format!("{}/job/app/", server.uri()))?
        .args(["-a", "-e", "staging", "-t", "release-42", "--live"])
        .output()?;
    assert!(
        output.status.success(),
        "status: {:?}\nstderr: {}",
        output.status,
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8(output.stdout)?;
    assert!(stdout.ends_with("building release-42\n"), "{stdout}");
    assert!(has_tag(&fx.root, "release-42")?);
    assert!(has_tag(&fx.remote, "release-42")?);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn rejected_build_exits_with_status() -> Result<()> {
    let fx = Fixture::new()?;
    let server = jenkins(200).await;
    Mock::given(method("GET"))
        .and(path("/job/app/buildWithParameters"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let output = fx
        .cmd(&format!("{}/job/app/", server.uri()))?
        .args(["-a", "-t", "release-43"])
        .output()?;
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8(output.stderr)?;
    assert!(
        stderr.contains("contacting jenkins failed with status code 500"),
        "{stderr}"
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn existing_tag_is_refused() -> Result<()> {
    let fx = Fixture::new()?;
    {
        let repo = Repository::open(&fx.root)?;
        let head = repo.head()?.peel(git2::ObjectType::Commit)?;
        repo.tag_lightweight("release-42", &head, false)?;
    }
    let server = jenkins(200).await;

    let output = fx
        .cmd(&format!("{}/job/app/", server.uri()))?
        .args(["-a", "-t", "release-42"])
        .output()?;
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8(output.stderr)?;
    assert!(stderr.contains("tag already exists"), "{stderr}");
    assert!(!has_tag(&fx.remote, "release-42")?);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn clean_tree_gate_requires_a_tracking_branch() -> Result<()> {
    let fx = Fixture::new()?;
    let server = jenkins(200).await;

    // `main` has no upstream, so `git pull` cannot succeed.
    let output = fx
        .cmd(&format!("{}/job/app/", server.uri()))?
        .args(["-n", "-t", "release-42"])
        .output()?;
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8(output.stderr)?;
    assert!(stderr.contains("git pull failed"), "{stderr}");
    Ok(())
}
