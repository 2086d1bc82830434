use super::*;

const CONFIG: &str = "sha256:1111111111111111111111111111111111111111111111111111111111111111";
const LAYER_A: &str = "sha256:aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
const LAYER_B: &str = "sha256:bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

fn v2_image() -> String {
    format!(
        r#"{{
            "schemaVersion": 2,
            "mediaType": "{}",
            "config": {{ "mediaType": "application/vnd.docker.container.image.v1+json", "size": 7023, "digest": "{}" }},
            "layers": [
                {{ "mediaType": "application/vnd.docker.image.rootfs.diff.tar.gzip", "size": 32654, "digest": "{}" }},
                {{ "mediaType": "application/vnd.docker.image.rootfs.diff.tar.gzip", "size": 16724, "digest": "{}",
                   "urls": ["https://cdn.example.com/b"] }}
            ]
        }}"#,
        media_types::V2_IMAGE,
        CONFIG,
        LAYER_A,
        LAYER_B
    )
}

#[test]
fn media_kind_names() {
    for kind in MediaKind::ALL.iter() {
        assert_eq!(MediaKind::from_media_type(kind.as_str()).unwrap(), *kind);
    }
    assert_eq!(
        MediaKind::from_media_type("application/vnd.oci.image.index.v1+json; charset=utf-8")
            .unwrap(),
        MediaKind::CurrentIndex
    );
    assert!(matches!(
        MediaKind::from_media_type("application/vnd.docker.container.image.v1+json"),
        Err(ImageError::UnsupportedManifestType(_))
    ));
    assert!(MediaKind::V2List.is_list());
    assert!(MediaKind::CurrentIndex.is_list());
    assert!(!MediaKind::V2Image.is_list());
    let accept = MediaKind::accept_header();
    assert!(accept.contains(media_types::LEGACY_V1_SIGNED));
    assert!(accept.contains(media_types::CURRENT_INDEX));
}

#[test]
fn guess_media_kind() {
    assert_eq!(
        MediaKind::guess(v2_image().as_bytes()),
        Some(MediaKind::V2Image)
    );
    assert_eq!(
        MediaKind::guess(br#"{"schemaVersion":1,"fsLayers":[],"signatures":[]}"#),
        Some(MediaKind::LegacyV1Signed)
    );
    assert_eq!(
        MediaKind::guess(br#"{"schemaVersion":1,"fsLayers":[]}"#),
        Some(MediaKind::LegacyV1)
    );
    assert_eq!(
        MediaKind::guess(br#"{"schemaVersion":2,"manifests":[]}"#),
        Some(MediaKind::CurrentIndex)
    );
    assert_eq!(
        MediaKind::guess(br#"{"schemaVersion":2,"config":{},"layers":[]}"#),
        Some(MediaKind::CurrentImage)
    );
    assert_eq!(MediaKind::guess(b"not json"), None);
    assert_eq!(MediaKind::guess(br#"{"schemaVersion":2}"#), None);
}

#[test]
fn parse_image_manifest() {
    let node = ManifestNode::parse(v2_image().as_bytes(), MediaKind::V2Image).unwrap();
    assert_eq!(node.kind(), MediaKind::V2Image);
    let config = node.config().unwrap();
    assert_eq!(config.digest.as_str(), CONFIG);
    assert_eq!(config.size, Some(7023));

    let layers = node.layers();
    assert_eq!(layers.len(), 2);
    assert_eq!(layers[0].digest.as_str(), LAYER_A);
    assert_eq!(layers[1].digest.as_str(), LAYER_B);
    assert_eq!(layers[1].urls, vec!["https://cdn.example.com/b".to_owned()]);
}

#[test]
fn parse_schema1_reverses_layers() {
    let json = format!(
        r#"{{
            "schemaVersion": 1,
            "name": "library/hello",
            "tag": "latest",
            "architecture": "amd64",
            "fsLayers": [ {{ "blobSum": "{}" }}, {{ "blobSum": "{}" }} ],
            "history": [],
            "signatures": []
        }}"#,
        LAYER_B, LAYER_A
    );
    let node = ManifestNode::parse(json.as_bytes(), MediaKind::LegacyV1Signed).unwrap();
    match &node {
        ManifestNode::LegacyV1Signed(m) => assert_eq!(m.architecture, "amd64"),
        other => panic!("unexpected {:?}", other),
    }
    assert!(node.config().is_none());
    let layers = node.layers();
    assert_eq!(layers[0].digest.as_str(), LAYER_A);
    assert_eq!(layers[1].digest.as_str(), LAYER_B);
    assert_eq!(layers[0].size, None);
}

#[test]
fn parse_list_platforms() {
    let json = format!(
        r#"{{
            "schemaVersion": 2,
            "mediaType": "{}",
            "manifests": [
                {{ "mediaType": "{}", "size": 1, "digest": "{}",
                   "platform": {{ "architecture": "arm", "os": "linux", "variant": "v7" }} }},
                {{ "mediaType": "{}", "size": 2, "digest": "{}",
                   "platform": {{ "architecture": "amd64", "os": "windows", "os.version": "10.0.17763.1",
                                  "os.features": ["win32k"] }} }}
            ]
        }}"#,
        media_types::V2_LIST,
        media_types::V2_IMAGE,
        LAYER_A,
        media_types::V2_IMAGE,
        LAYER_B
    );
    let node = ManifestNode::parse(json.as_bytes(), MediaKind::V2List).unwrap();
    let list = match &node {
        ManifestNode::V2List(list) => list,
        other => panic!("unexpected {:?}", other),
    };
    let arm = list.manifests[0].platform.as_ref().unwrap();
    assert_eq!(arm.variant, "v7");
    let win = list.manifests[1].platform.as_ref().unwrap();
    assert_eq!(win.os_version, "10.0.17763.1");
    assert!(win.extra.contains_key("os.features"));
    assert!(node.layers().is_empty());
    assert!(node.config().is_none());

    // unknown fields survive re-serialization
    let again = ManifestNode::parse(&node.to_bytes().unwrap(), MediaKind::V2List).unwrap();
    assert_eq!(again, node);
}

#[test]
fn malformed_manifest_is_json_error() {
    assert!(matches!(
        ManifestNode::parse(b"{", MediaKind::V2Image),
        Err(ImageError::JSON(_))
    ));
    assert!(matches!(
        ManifestNode::parse(br#"{"schemaVersion":2,"layers":[]}"#, MediaKind::CurrentImage),
        Err(ImageError::JSON(_))
    ));
}
