pub const CREATE_USERS: &str = r#"
CREATE TABLE IF NOT EXISTS users (
  id                INTEGER PRIMARY KEY AUTOINCREMENT,
  username          TEXT NOT NULL UNIQUE,
  email             TEXT NOT NULL UNIQUE,
  birth_day         INTEGER NOT NULL,
  birth_month       INTEGER NOT NULL,
  birth_year        INTEGER NOT NULL,
  password_hash     TEXT NOT NULL,
  role              TEXT NOT NULL DEFAULT 'student',
  streak            INTEGER DEFAULT 0,
  streak_counted_on TEXT,
  join_date         TEXT NOT NULL,
  location          TEXT,
  bio               TEXT,
  education         TEXT,
  favorite_game     TEXT
);
"#;

pub const CREATE_GAMES: &str = r#"
CREATE TABLE IF NOT EXISTS games (
  id        INTEGER PRIMARY KEY AUTOINCREMENT,
  user_id   INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
  game_name TEXT NOT NULL,
  score     INTEGER NOT NULL DEFAULT 0,
  level     INTEGER NOT NULL DEFAULT 1,
  UNIQUE(user_id, game_name)
);
"#;

pub const CREATE_BADGES: &str = r#"
CREATE TABLE IF NOT EXISTS badges (
  id         INTEGER PRIMARY KEY AUTOINCREMENT,
  user_id    INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
  badge_name TEXT NOT NULL,
  UNIQUE(user_id, badge_name)
);
"#;

pub const CREATE_ACTIVITIES: &str = r#"
CREATE TABLE IF NOT EXISTS activities (
  id            INTEGER PRIMARY KEY AUTOINCREMENT,
  user_id       INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
  activity_text TEXT NOT NULL,
  recorded_at   INTEGER NOT NULL
);
"#;

pub const CREATE_FRIENDS: &str = r#"
CREATE TABLE IF NOT EXISTS friends (
  id          INTEGER PRIMARY KEY AUTOINCREMENT,
  user_id     INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
  friend_name TEXT NOT NULL
);
"#;

pub const CREATE_GOALS: &str = r#"
CREATE TABLE IF NOT EXISTS goals (
  id        INTEGER PRIMARY KEY AUTOINCREMENT,
  user_id   INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
  goal_text TEXT NOT NULL,
  completed INTEGER NOT NULL DEFAULT 0
);
"#;

pub const CREATE_CLASSES: &str = r#"
CREATE TABLE IF NOT EXISTS classes (
  id         INTEGER PRIMARY KEY AUTOINCREMENT,
  owner_id   INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
  name       TEXT NOT NULL,
  join_code  TEXT NOT NULL UNIQUE,
  created_at INTEGER NOT NULL
);
"#;

pub const CREATE_CLASS_MEMBERS: &str = r#"
CREATE TABLE IF NOT EXISTS class_members (
  class_id  INTEGER NOT NULL REFERENCES classes(id) ON DELETE CASCADE,
  user_id   INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
  joined_at INTEGER NOT NULL,
  PRIMARY KEY (class_id, user_id)
);
"#;

pub const INDEX_ACTIVITIES_USER_RECORDED_AT: &str = "CREATE INDEX IF NOT EXISTS idx_activities_user_recorded_at ON activities(user_id, recorded_at);";

pub const INDEX_GAMES_USER: &str =
    "CREATE INDEX IF NOT EXISTS idx_games_user ON games(user_id);";

pub const INDEX_CLASS_MEMBERS_USER: &str =
    "CREATE INDEX IF NOT EXISTS idx_class_members_user ON class_members(user_id);";

pub fn schema_statements() -> Vec<&'static str> {
    vec![
        CREATE_USERS,
        CREATE_GAMES,
        CREATE_BADGES,
        CREATE_ACTIVITIES,
        CREATE_FRIENDS,
        CREATE_GOALS,
        CREATE_CLASSES,
        CREATE_CLASS_MEMBERS,
        INDEX_ACTIVITIES_USER_RECORDED_AT,
        INDEX_GAMES_USER,
        INDEX_CLASS_MEMBERS_USER,
    ]
}
