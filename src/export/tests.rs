use super::*;
use crate::{
    manifest::{ManifestNode, MediaKind},
    registry::MemorySource,
};
use serde_json::json;
use sha2::{Digest, Sha256};

fn digest(fill: char) -> ContentDigest {
    ContentDigest::parse(&format!("sha256:{}", fill.to_string().repeat(64))).unwrap()
}

fn sha256_hex(input: &str) -> String {
    format!("{:x}", Sha256::digest(input.as_bytes()))
}

#[test]
fn chain_ids_follow_layer_order() {
    let (aa, bb) = (digest('a'), digest('b'));
    let layers = chain_layers(&[Link::new(aa.clone(), Some(1)), Link::new(bb.clone(), Some(2))]);

    let id1 = sha256_hex(aa.as_str());
    let id2 = sha256_hex(&format!("{}{}", id1, bb.as_str()));
    assert_eq!(layers.len(), 2);
    assert_eq!(layers[0].chain_id, id1);
    assert_eq!(layers[0].parent_chain_id, "");
    assert_eq!(layers[1].chain_id, id2);
    assert_eq!(layers[1].parent_chain_id, id1);
    assert_eq!(layers[1].ordinal, 1);
    assert_eq!(layers[1].tar_path(), format!("{}/layer.tar", id2));

    // same digest on a different base gets a different ID
    let swapped = chain_layers(&[Link::new(bb, None), Link::new(aa, None)]);
    assert_ne!(swapped[1].chain_id, id1);
    assert!(chain_layers(&[]).is_empty());
}

#[test]
fn workdir_names() {
    assert_eq!(workdir_name("alpine"), "alpine_latest");
    assert_eq!(workdir_name("alpine:3.18"), "alpine_3.18");
    assert_eq!(workdir_name("library/alpine"), "library_alpine_latest");
    assert_eq!(
        workdir_name("registry.example.com/team/app:v2"),
        "registry.example.com_team_app_v2"
    );
}

#[test]
fn lower_layer_json() {
    let layers = chain_layers(&[Link::new(digest('a'), None), Link::new(digest('b'), None)]);
    let config = parse_config(br#"{"architecture":"amd64"}"#).unwrap();

    let first: Value =
        serde_json::from_slice(&layer_json(&config, &layers[0], false).unwrap()).unwrap();
    assert_eq!(first["id"], json!(layers[0].chain_id));
    assert!(first.get("parent").is_none());
    assert_eq!(first["created"], json!("1970-01-01T00:00:00Z"));
    assert_eq!(first["container_config"]["Cmd"], Value::Null);
    assert!(first.get("architecture").is_none());
}

#[test]
fn top_layer_json_uses_config() {
    let layers = chain_layers(&[Link::new(digest('a'), None), Link::new(digest('b'), None)]);
    let config = parse_config(
        br#"{"architecture":"amd64","os":"linux","history":[{"created_by":"x"}],"rootfs":{"type":"layers"}}"#,
    )
    .unwrap();

    let bytes = layer_json(&config, &layers[1], true).unwrap();
    let top: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(top["id"], json!(layers[1].chain_id));
    assert_eq!(top["parent"], json!(layers[0].chain_id));
    assert_eq!(top["architecture"], json!("amd64"));
    assert!(top.get("history").is_none());
    assert!(top.get("rootfs").is_none());
    assert!(top.get("container_config").is_none());
}

#[test]
fn single_layer_gets_config_without_parent() {
    let layers = chain_layers(&[Link::new(digest('c'), None)]);
    let config = parse_config(br#"{"os":"linux"}"#).unwrap();
    let only: Value =
        serde_json::from_slice(&layer_json(&config, &layers[0], true).unwrap()).unwrap();
    assert_eq!(only, json!({ "os": "linux", "id": layers[0].chain_id }));
}

#[test]
fn layer_json_escapes_like_legacy_archives() {
    let layers = chain_layers(&[Link::new(digest('a'), None)]);
    let config = parse_config(br#"{"config":{"Cmd":["/bin/sh","-c","a && b <x>"]}}"#).unwrap();
    let expected = format!(
        r#"{{"config":{{"Cmd":["/bin/sh","-c","a \u0026\u0026 b \u003cx\u003e"]}},"id":"{}"}}"#,
        layers[0].chain_id
    );
    assert_eq!(
        String::from_utf8(layer_json(&config, &layers[0], true).unwrap()).unwrap(),
        expected
    );
}

#[test]
fn config_must_be_an_object() {
    assert!(matches!(parse_config(b"[1, 2]"), Err(ImageError::MalformedConfig)));
    assert!(matches!(parse_config(b"{"), Err(ImageError::JSON(_))));
}

#[test]
fn tags_and_repositories() {
    let explicit = ImageReference::parse("team/app:v2", "registry.example.com").unwrap();
    assert_eq!(repo_tags(&explicit), vec!["team/app:v2"]);
    assert_eq!(
        repositories_json(&explicit, "abc").unwrap(),
        br#"{"team/app:v2":{"v2":"abc"}}"#.to_vec()
    );

    let ampersand = ImageReference::parse("team/a&b", "registry.example.com").unwrap();
    assert_eq!(
        repositories_json(&ampersand, "abc").unwrap(),
        br#"{"team/a\u0026b":{"latest":"abc"}}"#.to_vec()
    );

    let defaulted = ImageReference::parse("alpine", "registry.example.com").unwrap();
    assert_eq!(repo_tags(&defaulted), vec!["alpine:latest"]);
    assert_eq!(
        repositories_json(&defaulted, "def").unwrap(),
        br#"{"alpine":{"latest":"def"}}"#.to_vec()
    );
}

#[test]
fn manifest_entry_field_names() {
    let entry = ExportManifestEntry {
        config: "c.json".into(),
        repo_tags: vec!["a:b".into()],
        layers: vec!["x/layer.tar".into()],
    };
    assert_eq!(
        serde_json::to_string(&[&entry]).unwrap(),
        r#"[{"Config":"c.json","RepoTags":["a:b"],"Layers":["x/layer.tar"]}]"#
    );
}

struct Fixture {
    source: Arc<dyn Source>,
    resolved: ResolvedManifest,
    config: Vec<u8>,
    layers: Vec<Vec<u8>>,
}

/// An image with two layers; `second_layer` replaces what is stored for the
/// second layer's digest
fn fixture(second_layer: Option<Vec<u8>>) -> Fixture {
    let mut source = MemorySource::new();
    let layers = vec![b"base layer tar".to_vec(), vec![7u8; 100_000]];
    let config = serde_json::to_vec(&json!({
        "architecture": "amd64",
        "os": "linux",
        "config": { "Cmd": ["/bin/sh"] },
        "rootfs": { "type": "layers", "diff_ids": [] },
    }))
    .unwrap();
    let config_digest = source.insert_blob(config.clone());

    let mut links = vec![];
    for (index, content) in layers.iter().enumerate() {
        let digest = ContentDigest::from_content(content);
        if let (1, Some(stored)) = (index, &second_layer) {
            source.insert_blob_as(digest.clone(), stored.clone());
        } else {
            source.insert_blob(content.clone());
        }
        links.push(json!({
            "mediaType": "application/vnd.docker.image.rootfs.diff.tar.gzip",
            "size": content.len(),
            "digest": digest.as_str(),
        }));
    }
    let bytes = serde_json::to_vec(&json!({
        "schemaVersion": 2,
        "mediaType": MediaKind::V2Image.as_str(),
        "config": { "mediaType": "application/vnd.docker.container.image.v1+json",
                    "size": config.len(), "digest": config_digest.as_str() },
        "layers": links,
    }))
    .unwrap();
    let node = ManifestNode::parse(&bytes, MediaKind::V2Image).unwrap();

    Fixture {
        source: Arc::new(source),
        resolved: ResolvedManifest {
            node,
            digest: ContentDigest::from_content(&bytes),
            bytes,
        },
        config,
        layers,
    }
}

#[tokio::test]
async fn exports_legacy_layout() {
    let f = fixture(None);
    let tmp = tempfile::tempdir().unwrap();
    let destination = tmp.path().join(workdir_name("team/app:v2"));
    let reference = ImageReference::parse("team/app:v2", "registry.example.com").unwrap();

    let export = LegacyExporter::new(f.source.clone(), reference)
        .export(&f.resolved, &f.config, &destination)
        .await
        .unwrap();
    let dir = export.workdir.path().to_owned();
    assert_eq!(dir, destination);

    let config_name = format!("{}.json", f.resolved.node.config().unwrap().digest.hex_str());
    assert_eq!(std::fs::read(dir.join(&config_name)).unwrap(), f.config);

    for (layer, content) in export.layers.iter().zip(&f.layers) {
        let layer_dir = dir.join(&layer.chain_id);
        assert_eq!(std::fs::read(layer_dir.join("layer.tar")).unwrap(), *content);
        assert_eq!(std::fs::read_to_string(layer_dir.join("VERSION")).unwrap(), "1.0");
        let json: Value =
            serde_json::from_slice(&std::fs::read(layer_dir.join("json")).unwrap()).unwrap();
        assert_eq!(json["id"], json!(layer.chain_id));
    }

    let manifest: Vec<ExportManifestEntry> =
        serde_json::from_slice(&std::fs::read(dir.join("manifest.json")).unwrap()).unwrap();
    assert_eq!(manifest, vec![export.manifest.clone()]);
    assert_eq!(manifest[0].config, config_name);
    assert_eq!(manifest[0].repo_tags, vec!["team/app:v2"]);
    assert_eq!(
        manifest[0].layers,
        export.layers.iter().map(ExportLayer::tar_path).collect::<Vec<_>>()
    );

    let repositories: Value =
        serde_json::from_slice(&std::fs::read(dir.join("repositories")).unwrap()).unwrap();
    assert_eq!(
        repositories,
        json!({ "team/app:v2": { "v2": export.layers[1].chain_id } })
    );

    let kept = export.workdir.keep();
    assert!(kept.is_dir());
}

#[tokio::test]
async fn replaces_existing_workdir() {
    let f = fixture(None);
    let tmp = tempfile::tempdir().unwrap();
    let destination = tmp.path().join("app_latest");
    std::fs::create_dir_all(destination.join("stale")).unwrap();
    std::fs::write(destination.join("stale/file"), b"old").unwrap();

    let reference = ImageReference::parse("app", "registry.example.com").unwrap();
    let export = LegacyExporter::new(f.source.clone(), reference)
        .export(&f.resolved, &f.config, &destination)
        .await
        .unwrap();
    assert!(!destination.join("stale").exists());
    assert!(destination.join("manifest.json").is_file());

    export.workdir.remove().await.unwrap();
    assert!(!destination.exists());
}

#[tokio::test]
async fn short_layer_fails_and_cleans_up() {
    let f = fixture(Some(b"something else".to_vec()));
    let tmp = tempfile::tempdir().unwrap();
    let destination = tmp.path().join("app_latest");
    let reference = ImageReference::parse("app", "registry.example.com").unwrap();

    let err = LegacyExporter::new(f.source.clone(), reference)
        .export(&f.resolved, &f.config, &destination)
        .await
        .unwrap_err();
    match err {
        ImageError::Layer { digest, source } => {
            assert_eq!(digest, ContentDigest::from_content(&f.layers[1]));
            assert!(matches!(*source, ImageError::UnexpectedContentSize { .. }));
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(!destination.exists());
}

#[tokio::test]
async fn tampered_layer_fails_and_cleans_up() {
    // same length as the real layer, different bytes
    let f = fixture(Some(vec![8u8; 100_000]));
    let tmp = tempfile::tempdir().unwrap();
    let destination = tmp.path().join("app_latest");
    let reference = ImageReference::parse("app", "registry.example.com").unwrap();

    let err = LegacyExporter::new(f.source.clone(), reference)
        .export(&f.resolved, &f.config, &destination)
        .await
        .unwrap_err();
    match err {
        ImageError::Layer { digest, source } => {
            let expected_digest = ContentDigest::from_content(&f.layers[1]);
            assert_eq!(digest, expected_digest);
            match *source {
                ImageError::ContentDigestMismatch { expected, found } => {
                    assert_eq!(expected, expected_digest);
                    assert_eq!(found, ContentDigest::from_content(&vec![8u8; 100_000]));
                }
                other => panic!("unexpected {:?}", other),
            }
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(!destination.exists());
}

#[tokio::test]
async fn missing_layer_blob() {
    let f = fixture(None);
    let tmp = tempfile::tempdir().unwrap();
    let destination = tmp.path().join("app_latest");
    let reference = ImageReference::parse("app", "registry.example.com").unwrap();
    let empty: Arc<dyn Source> = Arc::new(MemorySource::new());

    let err = LegacyExporter::new(empty, reference)
        .export(&f.resolved, &f.config, &destination)
        .await
        .unwrap_err();
    match err {
        ImageError::Layer { source, .. } => {
            assert!(matches!(*source, ImageError::BlobNotFound(_)))
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(!destination.exists());
}

#[tokio::test]
async fn schema1_has_no_config() {
    let bytes = serde_json::to_vec(&json!({
        "schemaVersion": 1,
        "architecture": "amd64",
        "fsLayers": [ { "blobSum": digest('a').as_str() } ],
    }))
    .unwrap();
    let resolved = ResolvedManifest {
        node: ManifestNode::parse(&bytes, MediaKind::LegacyV1).unwrap(),
        digest: ContentDigest::from_content(&bytes),
        bytes,
    };
    let tmp = tempfile::tempdir().unwrap();
    let reference = ImageReference::parse("app", "registry.example.com").unwrap();
    let err = LegacyExporter::new(Arc::new(MemorySource::new()), reference)
        .export(&resolved, b"{}", &tmp.path().join("out"))
        .await
        .unwrap_err();
    assert!(matches!(err, ImageError::MissingConfig));
    assert!(!tmp.path().join("out").exists());
}
