use vgit_core::DockerConfig;

/// Render the Dockerfile for `config`.
pub fn render_dockerfile(config: &DockerConfig) -> String {
    let mut lines = vec![format!("FROM {}", config.from), "WORKDIR /".to_string()];

    if let Some(pattern) = config.build_copy.as_deref().filter(|p| !p.is_empty()) {
        lines.push(format!("COPY {pattern} ./"));
    }
    if let Some(command) = config.build_command.as_deref().filter(|c| !c.is_empty()) {
        lines.push(format!("RUN {command}"));
    }

    lines.push("COPY . .".to_string());
    lines.extend(config.exposed_ports.iter().map(|port| format!("EXPOSE {port}")));

    // Exec form: each argument is a JSON string.
    let args: Vec<String> = config
        .run_command
        .iter()
        .map(|arg| serde_json::Value::from(arg.as_str()).to_string())
        .collect();
    lines.push(format!("CMD [ {} ]", args.join(", ")));

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_preset() {
        assert_eq!(
            render_dockerfile(&DockerConfig::node()),
            "FROM node\n\
             WORKDIR /\n\
             COPY package*.json ./\n\
             RUN npm install\n\
             COPY . .\n\
             EXPOSE 8080\n\
             CMD [ \"npm\", \"run\", \"start\" ]"
        );
    }

    #[test]
    fn bare_config_skips_optional_steps() {
        assert_eq!(
            render_dockerfile(&DockerConfig::ubuntu()),
            "FROM ubuntu\nWORKDIR /\nCOPY . .\nCMD [  ]"
        );
    }

    #[test]
    fn empty_build_steps_are_skipped_and_ports_listed() {
        let config = DockerConfig {
            build_copy: Some(String::new()),
            build_command: Some(String::new()),
            exposed_ports: vec![3000, 9229],
            run_command: vec!["node".into(), "index.js".into()],
            ..DockerConfig::ubuntu()
        };
        assert_eq!(
            render_dockerfile(&config),
            "FROM ubuntu\n\
             WORKDIR /\n\
             COPY . .\n\
             EXPOSE 3000\n\
             EXPOSE 9229\n\
             CMD [ \"node\", \"index.js\" ]"
        );
    }

    #[test]
    fn run_arguments_are_escaped() {
        let config = DockerConfig {
            run_command: vec!["sh".into(), "-c".into(), "echo \"hi\"".into()],
            ..DockerConfig::ubuntu()
        };
        assert!(render_dockerfile(&config).ends_with(r#"CMD [ "sh", "-c", "echo \"hi\"" ]"#));
    }
}
