//! Bundled CulturaBuilder command table

/// (identifier, description, accepted arguments, examples)
pub type CommandRow = (
    &'static str,
    &'static str,
    &'static [&'static str],
    &'static [&'static str],
);

/// All `/cb:` commands shipped with CulturaBuilder
pub const BUILTIN_COMMANDS: &[CommandRow] = &[
    // Build & quality
    (
        "/cb:build",
        "🔨 Constrói componentes do projeto com detecção automática de framework",
        &["target", "--optimize", "--clean", "--type"],
        &["/cb:build frontend", "/cb:build --all --optimize"],
    ),
    (
        "/cb:analyze",
        "🔍 Analisa código e arquitetura com foco em qualidade e segurança",
        &["scope", "--deep", "--focus", "--report"],
        &["/cb:analyze --deep", "/cb:analyze --focus security"],
    ),
    (
        "/cb:deploy",
        "🚀 Implanta projeto em produção com rollback automático",
        &["--env", "--rollback-on-error", "--dry-run"],
        &[
            "/cb:deploy --env staging",
            "/cb:deploy --env prod --rollback-on-error",
        ],
    ),
    (
        "/cb:improve",
        "✨ Melhora código baseado em análise e melhores práticas",
        &["target", "--quality", "--performance", "--security"],
        &[
            "/cb:improve --quality",
            "/cb:improve --performance --focus critical",
        ],
    ),
    (
        "/cb:metrics",
        "📊 Visualiza métricas de uso e performance do projeto",
        &["--summary", "--export", "--period"],
        &["/cb:metrics --summary", "/cb:metrics --export html"],
    ),
    (
        "/cb:test",
        "🧪 Executa testes com cobertura e relatórios detalhados",
        &["type", "--coverage", "--watch", "--parallel"],
        &["/cb:test unit", "/cb:test --all --coverage"],
    ),
    (
        "/cb:document",
        "📝 Gera documentação bilíngue (PT-BR/EN-US) do projeto",
        &["type", "--lang", "--format", "--include-examples"],
        &[
            "/cb:document --lang pt-BR",
            "/cb:document api --format markdown",
        ],
    ),
    // Workflow & assistance
    (
        "/cb:workflow",
        "⚡ Cria e gerencia workflows complexos de desenvolvimento",
        &["action", "name", "--steps", "--automate"],
        &["/cb:workflow create ci-cd", "/cb:workflow run daily-tasks"],
    ),
    (
        "/cb:ai",
        "🤖 Assistente IA para sugestões e otimizações de código",
        &["query", "--context", "--suggest", "--explain"],
        &[
            "/cb:ai 'como otimizar este código?'",
            "/cb:ai suggest --context current-file",
        ],
    ),
    (
        "/cb:learn",
        "📚 Sistema de aprendizado interativo com tutoriais progressivos",
        &["topic", "--level", "--interactive", "--lang"],
        &["/cb:learn basics", "/cb:learn advanced --topic testing"],
    ),
    (
        "/cb:git",
        "📦 Gerenciamento Git com mensagens bilíngues e changelog automático",
        &["action", "--message", "--auto-changelog", "--semantic"],
        &[
            "/cb:git commit --message 'feat: novo componente'",
            "/cb:git release --semantic",
        ],
    ),
    (
        "/cb:scaffold",
        "🏗️ Cria estrutura de projetos com templates modernos",
        &["type", "name", "--template", "--with-tests"],
        &[
            "/cb:scaffold component Button",
            "/cb:scaffold api users --with-tests",
        ],
    ),
    (
        "/cb:refactor",
        "♻️ Refatora código mantendo funcionalidade e melhorando qualidade",
        &["target", "--pattern", "--safe-mode", "--preview"],
        &["/cb:refactor --pattern solid", "/cb:refactor legacy --safe-mode"],
    ),
    // Security & performance
    (
        "/cb:security",
        "🔒 Auditoria de segurança e correção de vulnerabilidades",
        &["--scan", "--fix", "--report", "--compliance"],
        &["/cb:security --scan", "/cb:security --fix --report"],
    ),
    (
        "/cb:performance",
        "⚡ Otimização de performance com métricas detalhadas",
        &["target", "--profile", "--optimize", "--benchmark"],
        &[
            "/cb:performance --profile",
            "/cb:performance --optimize bundle-size",
        ],
    ),
    // Settings & help
    (
        "/cb:config",
        "⚙️ Configuração do CulturaBuilder e personalização",
        &["action", "key", "value", "--global", "--reset"],
        &["/cb:config set language pt-BR", "/cb:config set theme dark"],
    ),
    (
        "/cb:help",
        "❓ Ajuda e documentação dos comandos CulturaBuilder",
        &["command", "--lang", "--examples"],
        &["/cb:help", "/cb:help build --examples"],
    ),
];
