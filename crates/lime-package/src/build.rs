//! Docker build requests
//!
//! A build plugin receives the Dockerfile text together with every extra file
//! of the build context embedded as ASCII85, so one YAML document carries the
//! whole context.

use crate::embedded::{EmbeddedFileContents, EmbeddedFiles};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Request to build an image from a Dockerfile and collect its output
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DockerBuildRequest {
    /// Dockerfile contents
    pub dockerfile: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(rename = "buildargs", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub build_args: BTreeMap<String, String>,
    /// Build context files, keyed by path relative to the context root
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub files: EmbeddedFiles,
    /// Directory inside the built image whose contents are extracted
    #[serde(rename = "buildDirectory", default)]
    pub build_directory: String,
}

impl DockerBuildRequest {
    pub fn new(dockerfile: impl Into<String>) -> Self {
        Self {
            dockerfile: dockerfile.into(),
            ..Self::default()
        }
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_build_arg(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.build_args.insert(name.into(), value.into());
        self
    }

    /// Add a context file, replacing one at the same path
    pub fn with_file(mut self, path: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        self.files
            .insert(path.into(), EmbeddedFileContents::new(contents));
        self
    }

    pub fn with_build_directory(mut self, directory: impl Into<String>) -> Self {
        self.build_directory = directory.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_field_names() {
        let request = DockerBuildRequest::new("FROM alpine\nCOPY run.sh /out/\n")
            .with_tag("web:1.0")
            .with_build_arg("VERSION", "1.0")
            .with_file("run.sh", b"#!/bin/sh\n".to_vec())
            .with_build_directory("/out");

        let yaml = request.to_yaml().unwrap();
        assert!(yaml.contains("buildargs:"));
        assert!(yaml.contains("buildDirectory: /out"));
        assert!(yaml.contains("run.sh:"));

        let back = DockerBuildRequest::from_yaml(&yaml).unwrap();
        assert_eq!(back, request);
        assert_eq!(&*back.files["run.sh"], b"#!/bin/sh\n");
    }

    #[test]
    fn test_optional_fields_default() {
        let request = DockerBuildRequest::from_yaml("dockerfile: FROM scratch\n").unwrap();
        assert_eq!(request, DockerBuildRequest::new("FROM scratch"));

        let yaml = request.to_yaml().unwrap();
        assert!(!yaml.contains("tags"));
        assert!(!yaml.contains("files"));
    }

    #[test]
    fn test_bad_embedded_file_is_rejected() {
        let yaml = "dockerfile: FROM scratch\nfiles:\n  a.txt: \"~~~\"\n";
        assert!(DockerBuildRequest::from_yaml(yaml).is_err());
    }
}
