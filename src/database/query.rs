pub const LIST_JOBS: &str = "
    SELECT id, title, description, email, type, category, location, created_at, expires
    FROM jobs
    LIMIT ?1
";

pub const GET_JOB_BY_ID: &str = "
    SELECT id, title, description, email, type, category, location, created_at, expires
    FROM jobs
    WHERE id = ?1
";

pub const INSERT_JOB: &str = "
    INSERT INTO jobs (title, description, email, type, category, location)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
";

pub const UPDATE_JOB: &str = "
    UPDATE jobs
    SET title = ?2, description = ?3, email = ?4, type = ?5, category = ?6, location = ?7
    WHERE id = ?1
";

pub const DELETE_JOB: &str = "
    DELETE FROM jobs
    WHERE id = ?1
";

pub const GET_USER_BY_USERNAME: &str = "
    SELECT username, password
    FROM users
    WHERE username = ?1
";

pub const INSERT_USER: &str = "
    INSERT INTO users (username, password)
    VALUES (?1, ?2)
";
