pub const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

-- games table
CREATE TABLE IF NOT EXISTS games (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    steam_app_id INTEGER UNIQUE,
    title TEXT NOT NULL,
    genre TEXT,
    platform TEXT,
    release_date TEXT,
    description TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_games_steam_app_id ON games(steam_app_id);

-- achievements table
CREATE TABLE IF NOT EXISTS achievements (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    game_id INTEGER NOT NULL REFERENCES games(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    description TEXT,
    points INTEGER,
    completion_rate REAL,
    is_main_story_completion INTEGER NOT NULL DEFAULT 0,
    UNIQUE(game_id, name)
);

CREATE INDEX IF NOT EXISTS idx_achievements_game_id ON achievements(game_id);

-- guides table (kind is 'link' or 'text')
CREATE TABLE IF NOT EXISTS guides (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    game_id INTEGER NOT NULL REFERENCES games(id) ON DELETE CASCADE,
    title TEXT NOT NULL,
    kind TEXT NOT NULL DEFAULT 'link',
    url TEXT,
    body TEXT,
    author TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE(game_id, url)
);

CREATE INDEX IF NOT EXISTS idx_guides_game_id ON guides(game_id);

-- parsed_guide_contents table (one row per guide, overwritten on re-parse)
CREATE TABLE IF NOT EXISTS parsed_guide_contents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    guide_id INTEGER NOT NULL UNIQUE REFERENCES guides(id) ON DELETE CASCADE,
    content TEXT NOT NULL,
    section_count INTEGER NOT NULL DEFAULT 0,
    parsed_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- hltb_times table (newest row per game is current)
CREATE TABLE IF NOT EXISTS hltb_times (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    game_id INTEGER NOT NULL REFERENCES games(id) ON DELETE CASCADE,
    main_story_hours REAL,
    extras_hours REAL,
    completionist_hours REAL,
    looked_up_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_hltb_times_game_id ON hltb_times(game_id);

-- engagement_scores table (append-only)
CREATE TABLE IF NOT EXISTS engagement_scores (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    game_id INTEGER NOT NULL REFERENCES games(id) ON DELETE CASCADE,
    score REAL NOT NULL,
    method TEXT NOT NULL,
    notes TEXT,
    calculated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_engagement_scores_game_id ON engagement_scores(game_id);
"#;
