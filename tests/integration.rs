use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Object, Stream};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn conecta_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("conecta");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let files_dir = root.join("files");
    fs::create_dir_all(&files_dir).unwrap();
    fs::write(
        files_dir.join("loja.txt"),
        "A Loja X vende eletrônicos e eletrodomésticos.\n\nO frete é grátis acima de cem reais.\x0cPagamento em até dez vezes no cartão.",
    )
    .unwrap();
    fs::write(
        files_dir.join("conversa.json"),
        r#"[
  {"role": "user", "content": "Qual o valor do frete?"},
  {"role": "assistant", "content": "O frete é grátis acima de cem reais."}
]"#,
    )
    .unwrap();
    fs::write(files_dir.join("vazia.json"), "[]").unwrap();
    fs::write(files_dir.join("planilha.xlsx"), "not really a spreadsheet").unwrap();

    // Generation stays disabled: any call reaching the generator fails.
    let config_content = format!(
        r#"[db]
path = "{}/data/conecta.sqlite"

[chunking]
chunk_size = 120
chunk_overlap = 20

[retrieval]
k = 3

[embedding]
provider = "hash"
dims = 128

[generation]
provider = "disabled"

[server]
bind = "127.0.0.1:7342"
"#,
        root.display()
    );

    let config_path = config_dir.join("conecta.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_conecta(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = conecta_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env("RUST_LOG", "off")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run conecta binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn file(tmp: &TempDir, name: &str) -> String {
    tmp.path().join("files").join(name).display().to_string()
}

/// Two-page PDF with one line of Helvetica text per page.
fn write_pdf(path: &Path, pages: &[&str]) {
    let mut doc = lopdf::Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 14.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        });
        kids.push(page_id.into());
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Count" => kids.len() as i64,
            "Kids" => kids,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).unwrap();
}

#[test]
fn test_init_creates_database() {
    let (tmp, config) = setup_test_env();
    let (stdout, stderr, success) = run_conecta(&config, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Database initialized successfully"));
    assert!(tmp.path().join("data").join("conecta.sqlite").exists());

    // Idempotent
    let (_, _, success) = run_conecta(&config, &["init"]);
    assert!(success);
}

#[test]
fn test_ingest_text_and_list_documents() {
    let (tmp, config) = setup_test_env();
    run_conecta(&config, &["init"]);

    let (stdout, stderr, success) =
        run_conecta(&config, &["ingest", &file(&tmp, "loja.txt"), "--user", "u1"]);
    assert!(success, "ingest failed: {}", stderr);
    assert!(stdout.contains("Ingested loja.txt"));
    assert!(stdout.contains("pages:       2"));

    let (stdout, _, success) = run_conecta(&config, &["documents", "--user", "u1", "--json"]);
    assert!(success);
    let docs: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let docs = docs.as_array().unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0]["source_label"], "loja.txt");
    assert!(docs[0]["chunk_count"].as_u64().unwrap() >= 2);

    let (stdout, _, success) = run_conecta(&config, &["documents", "--user", "u2"]);
    assert!(success);
    assert!(stdout.contains("No documents for user u2."));
}

#[test]
fn test_ask_without_documents_never_generates() {
    let (tmp, config) = setup_test_env();
    run_conecta(&config, &["init"]);
    run_conecta(&config, &["ingest", &file(&tmp, "loja.txt"), "--user", "u1"]);

    // u2 has nothing; with a disabled generator only the fixed answer can succeed.
    let (stdout, stderr, success) =
        run_conecta(&config, &["ask", "O que a Loja X vende?", "--user", "u2", "--json"]);
    assert!(success, "ask failed: {}", stderr);
    let answer: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(answer["text"], conecta_core::prompt::NO_RELEVANT_INFORMATION);
    assert_eq!(answer["sources"], serde_json::json!([]));
}

#[test]
fn test_ask_with_disabled_generator_reports_category() {
    let (tmp, config) = setup_test_env();
    run_conecta(&config, &["init"]);
    run_conecta(&config, &["ingest", &file(&tmp, "loja.txt"), "--user", "u1"]);

    let (stdout, stderr, success) =
        run_conecta(&config, &["ask", "O que a Loja X vende?", "--user", "u1"]);
    assert!(!success);
    assert!(stdout.is_empty());
    assert!(stderr.contains("error [generation_unavailable]"), "stderr: {}", stderr);
}

#[test]
fn test_ingest_unsupported_file_is_input_error() {
    let (tmp, config) = setup_test_env();
    run_conecta(&config, &["init"]);

    let (_, stderr, success) =
        run_conecta(&config, &["ingest", &file(&tmp, "planilha.xlsx"), "--user", "u1"]);
    assert!(!success);
    assert!(stderr.contains("error [input_error]"), "stderr: {}", stderr);

    let (_, stderr, success) =
        run_conecta(&config, &["ingest", &file(&tmp, "inexistente.pdf"), "--user", "u1"]);
    assert!(!success);
    assert!(stderr.contains("error [input_error]"));
}

#[test]
fn test_ingest_pdf_pages() {
    let (tmp, config) = setup_test_env();
    run_conecta(&config, &["init"]);
    let pdf = tmp.path().join("files").join("catalogo.pdf");
    write_pdf(&pdf, &["Loja X vende eletronicos", "Frete gratis acima de cem reais"]);

    let (stdout, stderr, success) =
        run_conecta(&config, &["ingest", pdf.to_str().unwrap(), "--user", "u1", "--json"]);
    assert!(success, "pdf ingest failed: {}", stderr);
    let doc: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(doc["source_label"], "catalogo.pdf");
    assert_eq!(doc["page_count"], 2);
    assert!(doc["chunk_count"].as_u64().unwrap() >= 2);
}

#[test]
fn test_topics_with_disabled_generator_fails() {
    let (tmp, config) = setup_test_env();
    let (_, stderr, success) = run_conecta(&config, &["topics", &file(&tmp, "conversa.json")]);
    assert!(!success);
    assert!(stderr.contains("error [generation_unavailable]"), "stderr: {}", stderr);
}

#[test]
fn test_topics_empty_transcript() {
    let (tmp, config) = setup_test_env();
    let (stdout, stderr, success) = run_conecta(&config, &["topics", &file(&tmp, "vazia.json")]);
    assert!(success, "topics failed: {}", stderr);
    assert!(stdout.contains("No topics found."));
}

#[test]
fn test_invalid_config_fails() {
    let (tmp, _) = setup_test_env();
    let bad = tmp.path().join("config").join("bad.toml");
    fs::write(&bad, "[db]\npath = \"x.sqlite\"\n[chunking]\nchunk_size = 10\nchunk_overlap = 10\n").unwrap();

    let (_, stderr, success) = run_conecta(&bad, &["init"]);
    assert!(!success);
    assert!(stderr.contains("chunk_overlap"));
}
