use std::fs;
use std::path::{Path, PathBuf};

pub const MEDIA_DIR_PLACEHOLDER: &str = "{media_dir}";
pub const PORT_PLACEHOLDER: &str = "{transcoder_port}";

#[derive(Debug)]
pub enum TemplateError {
    Read {
        path: PathBuf,
        error: std::io::Error,
    },
    Write {
        path: PathBuf,
        error: std::io::Error,
    },
}

impl std::fmt::Display for TemplateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TemplateError::Read { path, error } => {
                write!(f, "failed reading config template `{}`: {error}", path.display())
            }
            TemplateError::Write { path, error } => {
                write!(f, "failed writing worker config `{}`: {error}", path.display())
            }
        }
    }
}

impl std::error::Error for TemplateError {}

/// Substitutes the media directory and worker port in one left-to-right pass, so
/// substituted values are never rescanned. Everything else is kept verbatim.
pub fn render_template(template: &str, media_dir: &Path, port: u16) -> String {
    let media_dir = media_dir.display().to_string();
    let port = port.to_string();
    let substitutions = [
        (MEDIA_DIR_PLACEHOLDER, media_dir.as_str()),
        (PORT_PLACEHOLDER, port.as_str()),
    ];

    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        rendered.push_str(&rest[..open]);
        let candidate = &rest[open..];
        match substitutions
            .iter()
            .find(|(placeholder, _)| candidate.starts_with(placeholder))
        {
            Some((placeholder, value)) => {
                rendered.push_str(value);
                rest = &candidate[placeholder.len()..];
            }
            None => {
                rendered.push('{');
                rest = &candidate[1..];
            }
        }
    }
    rendered.push_str(rest);
    rendered
}

pub fn materialize_config(
    template_path: &Path,
    output_path: &Path,
    media_dir: &Path,
    port: u16,
) -> Result<PathBuf, TemplateError> {
    let template = fs::read_to_string(template_path).map_err(|error| TemplateError::Read {
        path: template_path.to_path_buf(),
        error,
    })?;
    let rendered = render_template(&template, media_dir, port);

    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent).map_err(|error| TemplateError::Write {
            path: parent.to_path_buf(),
            error,
        })?;
    }
    fs::write(output_path, rendered).map_err(|error| TemplateError::Write {
        path: output_path.to_path_buf(),
        error,
    })?;
    Ok(output_path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    #[test]
    fn render_template_replaces_both_placeholders() {
        let rendered = render_template(
            "root: {media_dir}\nport: {transcoder_port}\n",
            Path::new("/srv/media"),
            6002,
        );
        assert_eq!(rendered, "root: /srv/media\nport: 6002\n");
    }

    #[test]
    fn render_template_keeps_unrelated_braces() {
        let rendered = render_template("a: {other}\nb: {{x}}\n", Path::new("/m"), 1);
        assert_eq!(rendered, "a: {other}\nb: {{x}}\n");
    }

    #[test]
    fn render_template_does_not_rescan_substituted_values() {
        let rendered = render_template(
            "root: {media_dir}\nport: {transcoder_port}\n",
            Path::new("/srv/{transcoder_port}"),
            6002,
        );
        assert_eq!(rendered, "root: /srv/{transcoder_port}\nport: 6002\n");
    }

    #[test]
    fn render_template_replaces_repeated_and_adjacent_placeholders() {
        let rendered = render_template(
            "{{media_dir}}{transcoder_port}{media_dir}",
            Path::new("/m"),
            7,
        );
        assert_eq!(rendered, "{/m}7/m");
    }

    #[test]
    fn materialize_config_creates_parent_directories() {
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time")
            .as_nanos();
        let root = std::env::temp_dir().join(format!("crosshost-template-{ts}"));
        fs::create_dir_all(&root).expect("mkdir root");
        let template = root.join("config.yaml.template");
        fs::write(&template, "dir={media_dir} port={transcoder_port}").expect("write template");

        let output = root.join("media/transcode/config.yaml");
        let written =
            materialize_config(&template, &output, Path::new("/videos"), 7000).expect("render");
        assert_eq!(written, output);
        let content = fs::read_to_string(&output).expect("read output");
        assert_eq!(content, "dir=/videos port=7000");
    }

    #[test]
    fn materialize_config_reports_missing_template() {
        let missing = std::env::temp_dir().join("crosshost-no-such-template.yaml");
        let err = materialize_config(
            &missing,
            &std::env::temp_dir().join("crosshost-unused.yaml"),
            Path::new("/m"),
            1,
        )
        .expect_err("missing template");
        assert!(matches!(err, TemplateError::Read { .. }));
    }
}
