//! Default reference rows inserted on every startup.

/// Genres offered when creating a work.
pub const GENRES: &[&str] = &[
    "Ação",
    "Aventura",
    "Comédia",
    "Drama",
    "Fantasia",
    "Romance",
    "Terror",
    "Mistério",
    "Slice of Life",
    "Sobrenatural",
    "Isekai",
    "Ficção Científica",
];

/// Tags offered when creating a work.
pub const TAGS: &[&str] = &[
    "Magia",
    "Artes Marciais",
    "Escolar",
    "Vingança",
    "Reencarnação",
    "Sistema",
    "Protagonista Overpower",
    "Histórico",
];

/// Badges and how they are earned.
pub const TITLES: &[(&str, &str)] = &[
    ("Leitor Novato", "Leu o primeiro capítulo"),
    ("Leitor Assíduo", "Leu capítulos por 30 dias seguidos"),
    ("Devorador de Capítulos", "Leu mais de 1000 capítulos"),
    ("Apoiador VIP", "Assinante VIP"),
    ("Caçador de Bugs", "Reportou um bug confirmado"),
];

/// Settings and their initial values.
pub const SETTINGS: &[(&str, &str)] = &[(super::SETTING_VIP_LOCK_HOURS, "0")];
